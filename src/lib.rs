// Library exports for musicflow crate
// This allows integration tests to access the public API

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod player;
pub mod services;
pub mod storage;
pub mod stores;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::build_rocket;
pub use models::{Note, Priority, Task, TaskFilter, Track};
pub use player::{Demand, Phase, Player};
