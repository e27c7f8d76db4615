// Tempo client core
//
// Offline-capable client for the Tempo API: local task/timer state with a
// derived tag index, passwordless login against the auth gateway, and a
// reconciler that merges pulled server records and schedules debounced
// pushes of local mutations.

pub mod auth;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use auth::{AuthClient, AuthClientError, TokenBundle};
pub use storage::{ClientState, JsonFileStore, MemoryStore, StateStore};
pub use sync::{HttpSyncApi, Reconciler, SyncApi, SyncError};
pub use tasks::{format_hms, Interval, Task, TaskManager};
