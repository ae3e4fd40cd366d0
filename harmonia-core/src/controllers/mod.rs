//! Media-library controllers: one per entity type plus the `Music` facade
//! that wires them together and offers cross-entity lookups.

pub mod albums;
pub mod artists;
pub mod audiobooks;
pub mod base;
pub mod playlists;
pub mod podcasts;
pub mod radios;
pub mod tracks;

pub use albums::AlbumController;
pub use artists::ArtistController;
pub use audiobooks::AudiobookController;
pub use base::{
    sanitize_query, ControllerDeps, GetOptions, ItemController, LibraryEntity, MediaController,
    REFRESH_INTERVAL_SECS,
};
pub use playlists::PlaylistController;
pub use podcasts::PodcastController;
pub use radios::RadioController;
pub use tracks::TrackController;

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{MediaItemType, MediaType, SearchResults};
use crate::uri::parse_uri;
use crate::{Error, Result, DB_PROVIDER};

/// Facade over all media controllers.
pub struct Music {
    pub deps: Arc<ControllerDeps>,
    pub artists: Arc<ArtistController>,
    pub albums: Arc<AlbumController>,
    pub tracks: Arc<TrackController>,
    pub playlists: Arc<PlaylistController>,
    pub radios: Arc<RadioController>,
    pub audiobooks: Arc<AudiobookController>,
    pub podcasts: Arc<PodcastController>,
}

impl Music {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        let artists = ArtistController::new(deps.clone());
        let albums = AlbumController::new(deps.clone(), artists.clone());
        let tracks = TrackController::new(deps.clone(), artists.clone(), albums.clone());
        let playlists = PlaylistController::new(deps.clone(), tracks.clone());
        let radios = RadioController::new(deps.clone());
        let audiobooks = AudiobookController::new(deps.clone());
        let podcasts = PodcastController::new(deps.clone());
        Arc::new(Self {
            deps,
            artists,
            albums,
            tracks,
            playlists,
            radios,
            audiobooks,
            podcasts,
        })
    }

    /// Resolve a `{media_type}://{provider}/{item_id}` uri to a full item.
    pub async fn get_item_by_uri(&self, uri: &str) -> Result<MediaItemType> {
        let (media_type, provider, item_id) = parse_uri(uri)?;
        self.get_item(&item_id, media_type, &provider, true).await
    }

    /// Typed-dispatch single item lookup.
    pub async fn get_item(
        &self,
        item_id: &str,
        media_type: MediaType,
        provider_instance_or_domain: &str,
        lazy: bool,
    ) -> Result<MediaItemType> {
        macro_rules! opts {
            () => {
                GetOptions {
                    lazy,
                    ..Default::default()
                }
            };
        }
        match media_type {
            MediaType::Artist => self
                .artists
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Artist),
            MediaType::Album => self
                .albums
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Album),
            MediaType::Track => self
                .tracks
                .get_full(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Track),
            MediaType::Playlist => self
                .playlists
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Playlist),
            MediaType::Radio => self
                .radios
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Radio),
            MediaType::Audiobook => self
                .audiobooks
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Audiobook),
            MediaType::Podcast => self
                .podcasts
                .get(item_id, provider_instance_or_domain, opts!())
                .await
                .map(MediaItemType::Podcast),
            _ => Err(Error::InvalidInput(format!(
                "Cannot look up media type {media_type}"
            ))),
        }
    }

    /// Library add/remove by media type.
    pub async fn add_to_library(
        &self,
        item_id: &str,
        media_type: MediaType,
        provider_instance_or_domain: &str,
    ) -> Result<()> {
        match media_type {
            MediaType::Artist => {
                self.artists
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Album => {
                self.albums
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Track => {
                self.tracks
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Playlist => {
                self.playlists
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Radio => {
                self.radios
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Audiobook => {
                self.audiobooks
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Podcast => {
                self.podcasts
                    .base()
                    .add_to_library(item_id, provider_instance_or_domain)
                    .await
            }
            _ => Err(Error::InvalidInput(format!(
                "Cannot add media type {media_type} to library"
            ))),
        }
    }

    pub async fn remove_from_library(
        &self,
        item_id: &str,
        media_type: MediaType,
        provider_instance_or_domain: &str,
    ) -> Result<()> {
        match media_type {
            MediaType::Artist => {
                self.artists
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Album => {
                self.albums
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Track => {
                self.tracks
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Playlist => {
                self.playlists
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Radio => {
                self.radios
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Audiobook => {
                self.audiobooks
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            MediaType::Podcast => {
                self.podcasts
                    .base()
                    .remove_from_library(item_id, provider_instance_or_domain)
                    .await
            }
            _ => Err(Error::InvalidInput(format!(
                "Cannot remove media type {media_type} from library"
            ))),
        }
    }

    /// Search the canonical database and, when `online`, all unique
    /// providers; duplicates (same uri) are dropped.
    pub async fn search(
        &self,
        query: &str,
        media_types: &[MediaType],
        limit: usize,
        online: bool,
    ) -> Result<SearchResults> {
        let mut results = SearchResults::default();
        let mut providers = vec![DB_PROVIDER.to_string()];
        if online {
            providers.extend(
                self.deps
                    .registry
                    .unique_providers()
                    .iter()
                    .map(|provider| provider.instance_id().to_string()),
            );
        }

        for provider in &providers {
            for media_type in media_types {
                match media_type {
                    MediaType::Artist => {
                        if let Ok(items) = self.artists.base().search(query, provider, limit).await
                        {
                            results.artists.extend(items);
                        }
                    }
                    MediaType::Album => {
                        if let Ok(items) = self.albums.base().search(query, provider, limit).await {
                            results.albums.extend(items);
                        }
                    }
                    MediaType::Track => {
                        if let Ok(items) = self.tracks.base().search(query, provider, limit).await {
                            results.tracks.extend(items);
                        }
                    }
                    MediaType::Playlist => {
                        if let Ok(items) =
                            self.playlists.base().search(query, provider, limit).await
                        {
                            results.playlists.extend(items);
                        }
                    }
                    MediaType::Radio => {
                        if let Ok(items) = self.radios.base().search(query, provider, limit).await {
                            results.radios.extend(items);
                        }
                    }
                    MediaType::Audiobook => {
                        if let Ok(items) =
                            self.audiobooks.base().search(query, provider, limit).await
                        {
                            results.audiobooks.extend(items);
                        }
                    }
                    MediaType::Podcast => {
                        if let Ok(items) = self.podcasts.base().search(query, provider, limit).await
                        {
                            results.podcasts.extend(items);
                        }
                    }
                    _ => {}
                }
            }
        }

        dedupe_by_uri(&mut results.artists);
        dedupe_by_uri(&mut results.albums);
        dedupe_by_uri(&mut results.tracks);
        dedupe_by_uri(&mut results.playlists);
        dedupe_by_uri(&mut results.radios);
        dedupe_by_uri(&mut results.audiobooks);
        dedupe_by_uri(&mut results.podcasts);
        Ok(results)
    }
}

fn dedupe_by_uri<T: crate::models::MediaItem>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.uri().to_string()));
}
