// HTTP routes
pub mod auth;
pub mod health;
pub mod sync;

pub use auth::*;
pub use health::*;
pub use sync::*;
