//! Tasks domain - the synchronized task/time-record set
//!
//! The server is authoritative for record versions and for the set of
//! records a pull can see; clients own the live edit until it is pushed.

pub mod models;
pub mod store;

pub use models::{Interval, TaskRecord};
pub use store::{TaskStore, UpsertOutcome};
