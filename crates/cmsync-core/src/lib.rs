#![deny(clippy::all, warnings)]

mod provider;
mod reconcile;
mod state;
mod sync;

pub use provider::KubeConfigMaps;
pub use reconcile::{reconcile, CleanupError, CycleReport};
pub use state::{DesiredState, ObjectData, StateProvider, SyncError};
pub use sync::{run_cycle, run_loop, ErrorPolicy, SyncSettings};
