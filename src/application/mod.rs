pub mod party;
pub mod session;
