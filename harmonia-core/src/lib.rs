pub mod cache;
pub mod compare;
pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod player;
pub mod provider;
pub mod repository;
pub mod streams;
pub mod sync;
pub mod uri;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventType};

/// Provider id used for items resolved from the local canonical database.
pub const DB_PROVIDER: &str = "database";
