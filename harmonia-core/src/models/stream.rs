//! Stream resolution model.

use serde::{Deserialize, Serialize};

use super::media::{ContentType, MediaType};

/// Transport used to reach the audio of a resolved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Http,
    Hls,
    File,
    Pipe,
}

/// The resolved plan for streaming one queue item: chosen provider mapping,
/// format, transport and replay-gain.
///
/// The provider/item_id here may differ from the originating media item:
/// the stream coordinator picks the best available mapping, which can live
/// on any provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDetails {
    pub provider: String,
    pub item_id: String,
    #[serde(default = "default_media_type")]
    pub media_type: MediaType,
    pub content_type: ContentType,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
    pub stream_type: StreamType,
    /// Url, file path or pipe command, depending on `stream_type`.
    pub path: String,
    /// Duration in seconds, copied from the media item when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Total size in bytes, when known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Radio streams can set a now-playing title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_title: Option<String>,
    /// When set, the stream endpoint redirects instead of proxying.
    #[serde(default)]
    pub direct: bool,
    /// Timestamp (epoch seconds) these details expire.
    pub expires: i64,

    // The fields below are populated/mutated by the stream coordinator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_correct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness: Option<f64>,
    #[serde(default)]
    pub seconds_streamed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
}

const fn default_media_type() -> MediaType {
    MediaType::Track
}
const fn default_sample_rate() -> u32 {
    44100
}
const fn default_bit_depth() -> u32 {
    16
}
const fn default_channels() -> u32 {
    2
}

impl StreamDetails {
    /// Default lifetime of resolved stream details.
    pub const DEFAULT_TTL_SECS: i64 = 3600;

    pub fn new(
        provider: impl Into<String>,
        item_id: impl Into<String>,
        content_type: ContentType,
        stream_type: StreamType,
        path: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            item_id: item_id.into(),
            media_type: MediaType::Track,
            content_type,
            sample_rate: 44100,
            bit_depth: 16,
            channels: 2,
            stream_type,
            path: path.into(),
            duration: None,
            size: None,
            stream_title: None,
            direct: false,
            expires: chrono::Utc::now().timestamp() + Self::DEFAULT_TTL_SECS,
            gain_correct: None,
            loudness: None,
            seconds_streamed: 0.0,
            queue_id: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires
    }

    /// Uri representation, for logging.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}://{}/{}", self.provider, self.media_type, self.item_id)
    }
}
