mod code_allocator;
mod create_party;
mod finish_party;
mod get_party;
mod join_party;
mod leave_party;
mod record_score;
mod start_party;

pub use code_allocator::*;
pub use create_party::*;
pub use finish_party::*;
pub use get_party::*;
pub use join_party::*;
pub use leave_party::*;
pub use record_score::*;
pub use start_party::*;
