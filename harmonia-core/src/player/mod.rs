//! Player subsystem: per-player queues and the player manager.

pub mod manager;
pub mod queue;

pub use manager::{PlayerControl, PlayerControlType, PlayerManager, POLL_INTERVAL};
pub use queue::PlayerQueue;
