//! Vector index: flat generations, snapshots and the lifecycle manager.

pub mod flat;
pub mod manager;
pub mod snapshot;

pub use flat::{GenerationInfo, GenerationSource, IndexGeneration, SearchHit};
pub use manager::{IndexManager, IndexStatus, LifecycleState, RebuildReport, StartupOutcome};
pub use snapshot::SnapshotStore;
