pub mod task;

pub use task::{normalize_tag, Interval, TaskRecord};
