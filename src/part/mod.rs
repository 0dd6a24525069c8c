//! Partition tables as the installer sees and edits them.

pub mod engine;
pub mod model;
pub mod snapshot;
pub mod units;

pub use engine::Engine;
pub use model::{Action, DeviceRef, Entry, FreeRegion, Partition, Scheme, Snapshot, Table};
