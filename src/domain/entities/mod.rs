mod party;
mod player;

pub use party::*;
pub use player::*;
