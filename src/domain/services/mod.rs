mod lifecycle;
mod scoring;

pub use lifecycle::*;
pub use scoring::*;
