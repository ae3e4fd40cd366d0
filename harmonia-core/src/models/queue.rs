//! Player queue model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::MediaItemType;
use super::player::PlayerState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

/// How `play_media` merges new items into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOption {
    /// Insert at the current position and start playing there.
    Play,
    /// Replace the queue contents.
    Replace,
    /// Play after the current item.
    Next,
    /// Append at the end.
    Add,
}

/// One scheduled playback unit attached to one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_item_id: Uuid,
    pub media_item: MediaItemType,
    /// Transport url served by the stream endpoint.
    pub stream_url: String,
    /// Duration in seconds, taken from the media item.
    pub duration: u32,
    /// Seconds already played of this item.
    #[serde(default)]
    pub elapsed_time: u32,
}

impl QueueItem {
    #[must_use]
    pub fn new(media_item: MediaItemType, duration: u32) -> Self {
        Self {
            queue_item_id: Uuid::new_v4(),
            media_item,
            stream_url: String::new(),
            duration,
            elapsed_time: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.media_item.name()
    }
}

/// Serializable snapshot of a player queue, as exposed on the event bus
/// and the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub player_id: String,
    pub items: Vec<QueueItem>,
    pub cur_index: Option<usize>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    /// Crossfade duration in seconds; 0 disables crossfade.
    pub crossfade_duration: u32,
    pub state: PlayerState,
}
