mod join_code;
mod race_settings;
mod score_event;

pub use join_code::*;
pub use race_settings::*;
pub use score_event::*;
