pub mod repositories;
mod snapshot_hub;

pub use snapshot_hub::SnapshotHub;
