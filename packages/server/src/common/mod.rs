// Common types and utilities shared across the application

pub mod phone;

pub use phone::is_e164;
