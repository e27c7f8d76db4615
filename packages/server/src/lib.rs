// Tempo API Core
//
// Backend for the Tempo time tracker: passwordless SMS one-time-code
// authentication and per-user task record synchronization.
//
// Request handlers are stateless; all coordination state (login sessions,
// record versions) lives behind the store traits wired through kernel::ServerDeps.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
