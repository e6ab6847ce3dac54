mod error;
mod party_session;

pub use error::*;
pub use party_session::*;
