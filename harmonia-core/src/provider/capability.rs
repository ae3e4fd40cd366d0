use serde::{Deserialize, Serialize};

use crate::models::MediaType;

/// Capabilities a provider instance may declare.
///
/// Controllers and the sync engine query these before calling the matching
/// operation; a provider without the capability is skipped, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapability {
    LibraryArtists,
    LibraryAlbums,
    LibraryTracks,
    LibraryPlaylists,
    LibraryRadios,
    LibraryAudiobooks,
    LibraryPodcasts,
    LibraryArtistsEdit,
    LibraryAlbumsEdit,
    LibraryTracksEdit,
    LibraryPlaylistsEdit,
    LibraryRadiosEdit,
    Search,
    ArtistAlbums,
    ArtistTopTracks,
    ArtistMetadata,
    AlbumMetadata,
    TrackMetadata,
    SimilarTracks,
    PlaylistTracksEdit,
    PlaylistCreate,
    Browse,
}

impl ProviderCapability {
    /// The library-listing capability for a media type, if one exists.
    #[must_use]
    pub const fn library_for(media_type: MediaType) -> Option<Self> {
        match media_type {
            MediaType::Artist => Some(Self::LibraryArtists),
            MediaType::Album => Some(Self::LibraryAlbums),
            MediaType::Track => Some(Self::LibraryTracks),
            MediaType::Playlist => Some(Self::LibraryPlaylists),
            MediaType::Radio => Some(Self::LibraryRadios),
            MediaType::Audiobook => Some(Self::LibraryAudiobooks),
            MediaType::Podcast => Some(Self::LibraryPodcasts),
            _ => None,
        }
    }

    /// The library-edit capability for a media type, if one exists.
    #[must_use]
    pub const fn library_edit_for(media_type: MediaType) -> Option<Self> {
        match media_type {
            MediaType::Artist => Some(Self::LibraryArtistsEdit),
            MediaType::Album => Some(Self::LibraryAlbumsEdit),
            MediaType::Track => Some(Self::LibraryTracksEdit),
            MediaType::Playlist => Some(Self::LibraryPlaylistsEdit),
            MediaType::Radio => Some(Self::LibraryRadiosEdit),
            _ => None,
        }
    }
}
