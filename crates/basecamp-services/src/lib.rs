//! basecamp-services — the shared availability index the daemon serves.

pub mod registry;

pub use registry::{AvailabilityRegistry, FileSnapshot};
