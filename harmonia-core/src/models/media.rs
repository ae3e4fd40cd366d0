//! Base media model types: media types, content types, provider mappings
//! and the reduced `ItemMapping` projection.

use serde::{Deserialize, Serialize};

/// Discriminator for every media item kind known to the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Artist,
    Album,
    Track,
    Playlist,
    Radio,
    Audiobook,
    Podcast,
    Episode,
    Folder,
    Unknown,
}

impl MediaType {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "artist" => Some(Self::Artist),
            "album" => Some(Self::Album),
            "track" => Some(Self::Track),
            "playlist" => Some(Self::Playlist),
            "radio" => Some(Self::Radio),
            "audiobook" => Some(Self::Audiobook),
            "podcast" => Some(Self::Podcast),
            "episode" => Some(Self::Episode),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
            Self::Playlist => "playlist",
            Self::Radio => "radio",
            Self::Audiobook => "audiobook",
            Self::Podcast => "podcast",
            Self::Episode => "episode",
            Self::Folder => "folder",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio content/container type of a provider mapping or stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Flac,
    Alac,
    Wav,
    Aiff,
    Dsf,
    Ogg,
    Aac,
    Mp3,
    M4a,
    Wma,
    #[default]
    Unknown,
}

impl ContentType {
    /// Whether the codec is lossless.
    #[must_use]
    pub const fn is_lossless(&self) -> bool {
        matches!(
            self,
            Self::Flac | Self::Alac | Self::Wav | Self::Aiff | Self::Dsf
        )
    }

    /// Guess the content type from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "flac" => Self::Flac,
            "alac" => Self::Alac,
            "wav" => Self::Wav,
            "aif" | "aiff" => Self::Aiff,
            "dsf" => Self::Dsf,
            "ogg" | "oga" | "opus" => Self::Ogg,
            "aac" => Self::Aac,
            "mp3" => Self::Mp3,
            "m4a" | "mp4" => Self::M4a,
            "wma" => Self::Wma,
            _ => Self::Unknown,
        }
    }

    /// MIME type for the HTTP stream endpoint.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Flac => "audio/flac",
            Self::Alac | Self::M4a => "audio/mp4",
            Self::Wav => "audio/wav",
            Self::Aiff => "audio/aiff",
            Self::Dsf => "audio/dsf",
            Self::Ogg => "audio/ogg",
            Self::Aac => "audio/aac",
            Self::Mp3 => "audio/mpeg",
            Self::Wma => "audio/x-ms-wma",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// One provider's identifier (and quality details) for a canonical item.
///
/// Equality and hashing are by `(provider_instance, item_id)` so a set of
/// mappings holds at most one entry per provider item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMapping {
    pub item_id: String,
    /// Provider family, e.g. "filesystem", "spotify".
    pub provider_domain: String,
    /// Specific configured instance, e.g. "filesystem--8ball".
    pub provider_instance: String,
    #[serde(default = "default_true")]
    pub available: bool,
    // quality details (streamable content only)
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u32,
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,
    /// Optional provider specific details (e.g. a file path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Link to the provider's details page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

const fn default_true() -> bool {
    true
}
const fn default_sample_rate() -> u32 {
    44100
}
const fn default_bit_depth() -> u32 {
    16
}
const fn default_bit_rate() -> u32 {
    320
}

impl ProviderMapping {
    pub fn new(
        provider_instance: impl Into<String>,
        provider_domain: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            provider_domain: provider_domain.into(),
            provider_instance: provider_instance.into(),
            available: true,
            content_type: ContentType::Unknown,
            sample_rate: 44100,
            bit_depth: 16,
            bit_rate: 320,
            details: None,
            url: None,
        }
    }

    /// Quality score used to rank mappings when choosing a stream source.
    ///
    /// Lossless scores by resolution, lossy by bitrate with a small bonus
    /// for the more efficient codecs.
    #[must_use]
    pub fn quality(&self) -> u32 {
        if self.content_type.is_lossless() {
            return self.sample_rate / 1000 + self.bit_depth;
        }
        let mut score = self.bit_rate / 100;
        if matches!(self.content_type, ContentType::Aac | ContentType::Ogg) {
            score += 1;
        }
        score
    }
}

impl PartialEq for ProviderMapping {
    fn eq(&self, other: &Self) -> bool {
        self.provider_instance == other.provider_instance && self.item_id == other.item_id
    }
}

impl Eq for ProviderMapping {}

impl std::hash::Hash for ProviderMapping {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.provider_instance.hash(state);
        self.item_id.hash(state);
    }
}

/// Reduced projection of a media item, used to represent references
/// (an album's artists, a track's album) without materializing the full
/// object at rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemMapping {
    pub media_type: MediaType,
    pub item_id: String,
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub sort_name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub version: String,
}

/// Image attached to a media item's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItemImage {
    #[serde(rename = "type")]
    pub image_type: ImageType,
    pub path: String,
    /// Local file path instead of a url.
    #[serde(default)]
    pub is_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Thumb,
    Cover,
    Fanart,
    Logo,
    Other,
}

/// Album kind as reported by providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
    EpMini,
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mapping_set_uniqueness() {
        let mut mappings = HashSet::new();
        let mut a = ProviderMapping::new("spotify--1", "spotify", "abc");
        a.bit_rate = 160;
        let mut b = ProviderMapping::new("spotify--1", "spotify", "abc");
        b.bit_rate = 320;
        mappings.insert(a);
        // same (instance, item_id): replaces rather than duplicates
        mappings.replace(b);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings.iter().next().map(|m| m.bit_rate), Some(320));
    }

    #[test]
    fn test_quality_lossless_monotone() {
        let mut base = ProviderMapping::new("a", "a", "1");
        base.content_type = ContentType::Flac;
        base.sample_rate = 44100;
        base.bit_depth = 16;
        let mut hi_rate = base.clone();
        hi_rate.sample_rate = 96000;
        let mut hi_depth = base.clone();
        hi_depth.bit_depth = 24;
        assert!(hi_rate.quality() > base.quality());
        assert!(hi_depth.quality() > base.quality());
    }

    #[test]
    fn test_quality_lossy_monotone_and_codec_bonus() {
        let mut mp3 = ProviderMapping::new("a", "a", "1");
        mp3.content_type = ContentType::Mp3;
        mp3.bit_rate = 192;
        let mut mp3_hi = mp3.clone();
        mp3_hi.bit_rate = 320;
        assert!(mp3_hi.quality() > mp3.quality());

        let mut ogg = mp3.clone();
        ogg.content_type = ContentType::Ogg;
        assert!(ogg.quality() > mp3.quality());
    }

    #[test]
    fn test_lossless_beats_high_bitrate_lossy() {
        let mut flac = ProviderMapping::new("a", "a", "1");
        flac.content_type = ContentType::Flac;
        flac.sample_rate = 44100;
        flac.bit_depth = 16;
        let mut ogg = ProviderMapping::new("b", "b", "1");
        ogg.content_type = ContentType::Ogg;
        ogg.bit_rate = 320;
        assert!(flac.quality() > ogg.quality());
    }
}
