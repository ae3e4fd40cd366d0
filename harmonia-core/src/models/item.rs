//! The media item entities and their shared behaviour.
//!
//! Entity-to-entity references (a track's album, an album's artists) are
//! stored as [`ItemMapping`] projections; full hydration happens on demand
//! in the controllers. This keeps items finite at rest and avoids load-time
//! reference cycles.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::media::{
    AlbumType, ItemMapping, MediaItemImage, MediaType, ProviderMapping,
};
use super::metadata::MediaItemMetadata;
use crate::compare::create_sort_name;
use crate::uri::create_uri;

/// Shared accessors implemented by every media item entity.
pub trait MediaItem: Clone + Send + Sync + 'static {
    const MEDIA_TYPE: MediaType;

    fn item_id(&self) -> &str;
    fn set_item_id(&mut self, item_id: String);
    fn provider(&self) -> &str;
    fn set_provider(&mut self, provider: String);
    fn name(&self) -> &str;
    /// Set the name, rederiving the sort name.
    fn set_name(&mut self, name: String);
    fn sort_name(&self) -> &str;
    fn uri(&self) -> &str;
    fn set_uri(&mut self, uri: String);
    fn in_library(&self) -> bool;
    fn set_in_library(&mut self, in_library: bool);
    fn timestamp_added(&self) -> i64;
    fn timestamp_modified(&self) -> i64;
    fn set_timestamps(&mut self, added: i64, modified: i64);
    fn provider_mappings(&self) -> &HashSet<ProviderMapping>;
    fn provider_mappings_mut(&mut self) -> &mut HashSet<ProviderMapping>;
    fn metadata(&self) -> &MediaItemMetadata;
    fn metadata_mut(&mut self) -> &mut MediaItemMetadata;
    fn regenerate_derived_fields(&mut self);

    fn media_type(&self) -> MediaType {
        Self::MEDIA_TYPE
    }

    /// An item is available when at least one provider mapping is.
    fn available(&self) -> bool {
        self.provider_mappings().iter().any(|m| m.available)
    }

    /// Add a provider mapping, replacing any existing entry for the same
    /// `(provider_instance, item_id)` pair.
    fn add_provider_mapping(&mut self, mapping: ProviderMapping) {
        self.provider_mappings_mut().replace(mapping);
    }

    /// Reduced projection for storing references to this item.
    fn to_item_mapping(&self) -> ItemMapping {
        ItemMapping {
            media_type: self.media_type(),
            item_id: self.item_id().to_string(),
            provider: self.provider().to_string(),
            name: self.name().to_string(),
            sort_name: self.sort_name().to_string(),
            uri: self.uri().to_string(),
            version: String::new(),
        }
    }

    /// First image of the given preference order, if any.
    fn image(&self) -> Option<&MediaItemImage> {
        self.metadata().images.first()
    }
}

macro_rules! impl_media_item {
    ($entity:ty, $media_type:expr) => {
        impl MediaItem for $entity {
            const MEDIA_TYPE: MediaType = $media_type;

            fn item_id(&self) -> &str {
                &self.item_id
            }
            fn set_item_id(&mut self, item_id: String) {
                self.item_id = item_id;
            }
            fn provider(&self) -> &str {
                &self.provider
            }
            fn set_provider(&mut self, provider: String) {
                self.provider = provider;
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn set_name(&mut self, name: String) {
                self.sort_name = create_sort_name(&name);
                self.name = name;
            }
            fn sort_name(&self) -> &str {
                &self.sort_name
            }
            fn uri(&self) -> &str {
                &self.uri
            }
            fn set_uri(&mut self, uri: String) {
                self.uri = uri;
            }
            fn in_library(&self) -> bool {
                self.in_library
            }
            fn set_in_library(&mut self, in_library: bool) {
                self.in_library = in_library;
            }
            fn timestamp_added(&self) -> i64 {
                self.timestamp_added
            }
            fn timestamp_modified(&self) -> i64 {
                self.timestamp_modified
            }
            fn set_timestamps(&mut self, added: i64, modified: i64) {
                self.timestamp_added = added;
                self.timestamp_modified = modified;
            }
            fn provider_mappings(&self) -> &HashSet<ProviderMapping> {
                &self.provider_mappings
            }
            fn provider_mappings_mut(&mut self) -> &mut HashSet<ProviderMapping> {
                &mut self.provider_mappings
            }
            fn metadata(&self) -> &MediaItemMetadata {
                &self.metadata
            }
            fn metadata_mut(&mut self) -> &mut MediaItemMetadata {
                &mut self.metadata
            }

            /// `uri` and `sort_name` are derived and never null on a
            /// persisted entity; regenerate them when missing.
            fn regenerate_derived_fields(&mut self) {
                if self.sort_name.is_empty() {
                    self.sort_name = create_sort_name(&self.name);
                }
                if self.uri.is_empty() {
                    self.uri = create_uri(Self::MEDIA_TYPE, &self.provider, &self.item_id);
                }
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artist {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub musicbrainz_id: Option<String>,
}

impl Artist {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Artist, MediaType::Artist);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub version: String,
    pub year: Option<u32>,
    pub artists: Vec<ItemMapping>,
    pub album_type: AlbumType,
    pub upc: Option<String>,
    /// Release-group id.
    pub musicbrainz_id: Option<String>,
}

impl Album {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }

    /// First (primary) artist of the album.
    #[must_use]
    pub fn artist(&self) -> Option<&ItemMapping> {
        self.artists.first()
    }
}

impl_media_item!(Album, MediaType::Album);

/// A track's appearance on an album, carrying the disc/track position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackAlbumMapping {
    #[serde(flatten)]
    pub album: ItemMapping,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    /// Duration in seconds.
    pub duration: u32,
    pub version: String,
    pub isrcs: BTreeSet<String>,
    /// Recording id.
    pub musicbrainz_id: Option<String>,
    pub artists: Vec<ItemMapping>,
    /// Album context of this particular track instance (album tracks only).
    pub album: Option<ItemMapping>,
    /// All known album appearances of this track.
    pub albums: Vec<TrackAlbumMapping>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    /// Position within a playlist (playlist tracks only).
    pub position: Option<u32>,
}

impl Track {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }

    /// First (primary) artist of the track.
    #[must_use]
    pub fn artist(&self) -> Option<&ItemMapping> {
        self.artists.first()
    }
}

impl_media_item!(Track, MediaType::Track);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub owner: String,
    pub is_editable: bool,
}

impl Playlist {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Playlist, MediaType::Playlist);

/// Duration assigned to radio streams (they have none; pick a large value
/// so queue duration math stays finite).
pub const RADIO_DURATION: u32 = 172_800;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Radio {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub duration: u32,
}

impl Default for Radio {
    fn default() -> Self {
        Self {
            item_id: String::new(),
            provider: String::new(),
            name: String::new(),
            sort_name: String::new(),
            uri: String::new(),
            in_library: false,
            provider_mappings: HashSet::new(),
            metadata: MediaItemMetadata::default(),
            timestamp_added: 0,
            timestamp_modified: 0,
            duration: RADIO_DURATION,
        }
    }
}

impl Radio {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Radio, MediaType::Radio);

/// A chapter marker inside an audiobook or podcast episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub position: u32,
    pub name: String,
    pub start_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Audiobook {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub publisher: Option<String>,
    /// Duration in seconds.
    pub duration: u32,
    pub chapters: Vec<Chapter>,
    pub resume_position_ms: u64,
    pub fully_played: bool,
}

impl Audiobook {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Audiobook, MediaType::Audiobook);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Podcast {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub publisher: Option<String>,
    pub total_episodes: Option<u32>,
}

impl Podcast {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Podcast, MediaType::Podcast);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    pub podcast: Option<ItemMapping>,
    /// Duration in seconds.
    pub duration: u32,
    pub episode_number: Option<u32>,
    pub chapters: Vec<Chapter>,
    pub resume_position_ms: u64,
    pub fully_played: bool,
}

impl Episode {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        item
    }
}

impl_media_item!(Episode, MediaType::Episode);

/// Hierarchical browse node; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseFolder {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub sort_name: String,
    pub uri: String,
    pub in_library: bool,
    pub provider_mappings: HashSet<ProviderMapping>,
    pub metadata: MediaItemMetadata,
    pub timestamp_added: i64,
    pub timestamp_modified: i64,

    /// Uri-style path to this folder.
    pub path: String,
    /// Subitems when expanded.
    pub items: Option<Vec<MediaItemType>>,
}

impl BrowseFolder {
    pub fn new(item_id: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        let mut item = Self {
            item_id: item_id.into(),
            provider: provider.into(),
            name: name.into(),
            ..Default::default()
        };
        item.regenerate_derived_fields();
        if item.path.is_empty() {
            item.path = format!("{}://{}", item.provider, item.item_id);
        }
        item
    }
}

impl_media_item!(BrowseFolder, MediaType::Folder);

/// Sum type over every concrete media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "media_type", rename_all = "snake_case")]
pub enum MediaItemType {
    Artist(Artist),
    Album(Album),
    Track(Track),
    Playlist(Playlist),
    Radio(Radio),
    Audiobook(Audiobook),
    Podcast(Podcast),
    Episode(Episode),
    Folder(BrowseFolder),
}

macro_rules! dispatch {
    ($self:expr, $item:ident => $body:expr) => {
        match $self {
            MediaItemType::Artist($item) => $body,
            MediaItemType::Album($item) => $body,
            MediaItemType::Track($item) => $body,
            MediaItemType::Playlist($item) => $body,
            MediaItemType::Radio($item) => $body,
            MediaItemType::Audiobook($item) => $body,
            MediaItemType::Podcast($item) => $body,
            MediaItemType::Episode($item) => $body,
            MediaItemType::Folder($item) => $body,
        }
    };
}

impl MediaItemType {
    #[must_use]
    pub fn media_type(&self) -> MediaType {
        dispatch!(self, item => item.media_type())
    }

    #[must_use]
    pub fn item_id(&self) -> &str {
        dispatch!(self, item => item.item_id())
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        dispatch!(self, item => item.provider())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        dispatch!(self, item => item.name())
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        dispatch!(self, item => item.uri())
    }

    #[must_use]
    pub fn available(&self) -> bool {
        dispatch!(self, item => item.available())
    }

    #[must_use]
    pub fn to_item_mapping(&self) -> ItemMapping {
        dispatch!(self, item => item.to_item_mapping())
    }

    #[must_use]
    pub fn provider_mappings(&self) -> &HashSet<ProviderMapping> {
        dispatch!(self, item => item.provider_mappings())
    }

    /// Duration in seconds, for the playable variants.
    #[must_use]
    pub fn duration(&self) -> Option<u32> {
        match self {
            Self::Track(track) => Some(track.duration),
            Self::Radio(radio) => Some(radio.duration),
            Self::Audiobook(audiobook) => Some(audiobook.duration),
            Self::Episode(episode) => Some(episode.duration),
            _ => None,
        }
    }
}

/// Per-media-type buckets returned by a provider search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub tracks: Vec<Track>,
    pub playlists: Vec<Playlist>,
    pub radios: Vec<Radio>,
    pub audiobooks: Vec<Audiobook>,
    pub podcasts: Vec<Podcast>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields() {
        let artist = Artist::new("abc", "spotify", "The Beatles");
        assert_eq!(artist.uri, "artist://spotify/abc");
        assert_eq!(artist.sort_name, "beatles");
    }

    #[test]
    fn test_available_requires_available_mapping() {
        let mut track = Track::new("1", "spotify", "Something");
        assert!(!track.available());
        let mut mapping = ProviderMapping::new("spotify--1", "spotify", "1");
        mapping.available = false;
        track.add_provider_mapping(mapping.clone());
        assert!(!track.available());
        mapping.available = true;
        track.add_provider_mapping(mapping);
        assert!(track.available());
        // the replace kept a single entry
        assert_eq!(track.provider_mappings.len(), 1);
    }

    #[test]
    fn test_media_item_type_serde_tag() {
        let track = Track::new("1", "spotify", "Something");
        let value = serde_json::to_value(MediaItemType::Track(track)).unwrap();
        assert_eq!(value["media_type"], "track");
        let back: MediaItemType = serde_json::from_value(value).unwrap();
        assert_eq!(back.media_type(), MediaType::Track);
    }
}
