//! Playlist controller.
//!
//! Playlist identity carries a checksum used to invalidate cached track
//! listings: every edit bumps it with the current wall-clock, so the next
//! listing bypasses the cache and refetches from the owning provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::base::{ControllerDeps, GetOptions, ItemController, MediaController};
use super::tracks::TrackController;
use crate::models::{MediaItem, MediaType, Playlist, ProviderMapping, Track};
use crate::provider::{with_provider_policy, ProviderCapability};
use crate::repository::{MediaItemRepository, ProviderMappingRepository};
use crate::uri::parse_uri;
use crate::{Error, Result, DB_PROVIDER};

const PLAYLIST_TRACKS_CACHE_TTL: Duration = Duration::from_secs(86_400);

#[derive(Clone)]
pub struct PlaylistController {
    base: Arc<MediaController<Playlist>>,
    tracks: Arc<TrackController>,
    track_repo: MediaItemRepository<Track>,
    track_mappings: ProviderMappingRepository,
}

impl PlaylistController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>, tracks: Arc<TrackController>) -> Arc<Self> {
        let track_repo = MediaItemRepository::new(deps.db.pool().clone());
        let track_mappings = ProviderMappingRepository::new(deps.db.pool().clone());
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
            tracks,
            track_repo,
            track_mappings,
        })
    }

    /// The playlist's tracks from the owning provider, positions assigned,
    /// canonical rows substituted. Cached per checksum.
    pub async fn playlist_tracks(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Track>> {
        let playlist = self
            .get(item_id, provider_instance_or_domain, GetOptions::default())
            .await?;
        let Some((prov_instance, prov_item_id)) = self.base.preferred_provider_mapping(&playlist)
        else {
            return Ok(Vec::new());
        };
        let checksum = playlist.metadata().checksum.clone();
        let cache_key = format!("playlist_tracks.{prov_instance}.{prov_item_id}");

        let this = self.clone();
        let tracks: Vec<Track> = self
            .base
            .deps()
            .cache
            .get_or_compute(&cache_key, checksum, PLAYLIST_TRACKS_CACHE_TTL, async move {
                this.fetch_playlist_tracks(&prov_instance, &prov_item_id).await
            })
            .await?;
        Ok(tracks)
    }

    async fn fetch_playlist_tracks(
        &self,
        prov_instance: &str,
        prov_item_id: &str,
    ) -> Result<Vec<Track>> {
        let Some(provider) = self.base.deps().registry.get(prov_instance) else {
            return Ok(Vec::new());
        };
        let mut tracks = Vec::new();
        let mut position = 0_u32;
        let mut stream = provider.playlist_tracks(prov_item_id);
        while let Some(track) = stream.next().await {
            let mut track = match track {
                Ok(track) => track,
                Err(err) => {
                    tracing::warn!(%err, "skipping track from playlist listing");
                    continue;
                }
            };
            if let Some(db_id) = self
                .track_mappings
                .get_db_id(MediaType::Track, prov_instance, &track.item_id)
                .await?
            {
                if let Some(db_track) = self.track_repo.get(db_id).await? {
                    track = db_track;
                }
            }
            track.position = Some(position);
            position += 1;
            tracks.push(track);
        }
        Ok(tracks)
    }

    /// Add tracks (by uri) to an editable playlist, deduping against the
    /// current contents. For each track the highest-quality mapping on the
    /// playlist's own provider is used; filesystem playlists accept foreign
    /// uris verbatim.
    pub async fn add_playlist_tracks(&self, db_playlist_id: i64, uris: &[String]) -> Result<()> {
        let playlist = self.base.get_db_item(&db_playlist_id.to_string()).await?;
        if !playlist.is_editable {
            return Err(Error::Unsupported(format!(
                "Playlist {} is not editable",
                playlist.name()
            )));
        }
        let Some(playlist_mapping) = playlist.provider_mappings().iter().next().cloned() else {
            return Err(Error::MediaNotFound("Playlist has no provider".to_string()));
        };
        let is_filesystem = playlist_mapping.provider_domain.starts_with("filesystem");

        // current contents, for duplicate detection
        let mut existing_ids: Vec<String> = Vec::new();
        for track in self
            .fetch_playlist_tracks(&playlist_mapping.provider_instance, &playlist_mapping.item_id)
            .await?
        {
            existing_ids.push(track.item_id().to_string());
            for mapping in track.provider_mappings() {
                existing_ids.push(mapping.item_id.clone());
            }
        }

        let mut ids_to_add = Vec::new();
        for uri in uris {
            let (media_type, provider, item_id) = parse_uri(uri)?;
            if media_type != MediaType::Track {
                return Err(Error::InvalidInput(format!(
                    "Only tracks can be added to a playlist: {uri}"
                )));
            }
            let track = self
                .tracks
                .get(&item_id, &provider, GetOptions::strict())
                .await?;
            let already_present = existing_ids.contains(&track.item_id().to_string())
                || track
                    .provider_mappings()
                    .iter()
                    .any(|mapping| existing_ids.contains(&mapping.item_id));
            if already_present {
                continue;
            }
            // best-quality mapping on the target provider wins; filesystem
            // targets store foreign uris verbatim
            let mut mappings: Vec<ProviderMapping> =
                track.provider_mappings().iter().cloned().collect();
            mappings.sort_by_key(|mapping| std::cmp::Reverse(mapping.quality()));
            let mut added = false;
            for mapping in &mappings {
                if mapping.provider_domain == playlist_mapping.provider_domain {
                    ids_to_add.push(mapping.item_id.clone());
                    added = true;
                    break;
                }
            }
            if !added && is_filesystem {
                if let Some(best) = mappings.first() {
                    ids_to_add.push(crate::uri::create_uri(
                        MediaType::Track,
                        &best.provider_instance,
                        &best.item_id,
                    ));
                    added = true;
                }
            }
            if !added {
                tracing::warn!(
                    uri,
                    provider = %playlist_mapping.provider_domain,
                    "track not available on playlist provider"
                );
            }
        }
        if ids_to_add.is_empty() {
            return Ok(());
        }

        self.bump_checksum(&playlist, db_playlist_id).await?;
        let provider = self
            .base
            .deps()
            .registry
            .get(&playlist_mapping.provider_instance)
            .ok_or_else(|| {
                Error::ProviderUnavailable(playlist_mapping.provider_instance.clone())
            })?;
        if !provider.supports(ProviderCapability::PlaylistTracksEdit) {
            return Err(Error::Unsupported(format!(
                "{} does not support playlist edits",
                provider.domain()
            )));
        }
        with_provider_policy("add_playlist_tracks", || {
            provider.add_playlist_tracks(&playlist_mapping.item_id, &ids_to_add)
        })
        .await
    }

    /// Remove tracks (by uri) from an editable playlist. Every mapping of
    /// each track on the playlist's provider is removed.
    pub async fn remove_playlist_tracks(&self, db_playlist_id: i64, uris: &[String]) -> Result<()> {
        let playlist = self.base.get_db_item(&db_playlist_id.to_string()).await?;
        if !playlist.is_editable {
            return Err(Error::Unsupported(format!(
                "Playlist {} is not editable",
                playlist.name()
            )));
        }
        let Some(playlist_mapping) = playlist.provider_mappings().iter().next().cloned() else {
            return Err(Error::MediaNotFound("Playlist has no provider".to_string()));
        };

        let mut ids_to_remove = Vec::new();
        for uri in uris {
            let (_, provider, item_id) = parse_uri(uri)?;
            let track = self
                .tracks
                .get(&item_id, &provider, GetOptions::strict())
                .await?;
            for mapping in track.provider_mappings() {
                if mapping.provider_instance == playlist_mapping.provider_instance
                    || mapping.provider_domain == playlist_mapping.provider_domain
                {
                    ids_to_remove.push(mapping.item_id.clone());
                }
            }
        }
        if ids_to_remove.is_empty() {
            return Ok(());
        }

        self.bump_checksum(&playlist, db_playlist_id).await?;
        let provider = self
            .base
            .deps()
            .registry
            .get(&playlist_mapping.provider_instance)
            .ok_or_else(|| {
                Error::ProviderUnavailable(playlist_mapping.provider_instance.clone())
            })?;
        with_provider_policy("remove_playlist_tracks", || {
            provider.remove_playlist_tracks(&playlist_mapping.item_id, &ids_to_remove)
        })
        .await
    }

    /// Create a new playlist on the given provider and add it to the
    /// canonical library.
    pub async fn create_playlist(
        &self,
        name: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Playlist> {
        let provider = self
            .base
            .deps()
            .registry
            .get(provider_instance_or_domain)
            .ok_or_else(|| {
                Error::ProviderUnavailable(provider_instance_or_domain.to_string())
            })?;
        if !provider.supports(ProviderCapability::PlaylistCreate) {
            return Err(Error::Unsupported(format!(
                "{} does not support playlist creation",
                provider.domain()
            )));
        }
        let playlist =
            with_provider_policy("create_playlist", || provider.create_playlist(name)).await?;
        self.add(playlist, true).await
    }

    async fn bump_checksum(&self, playlist: &Playlist, db_playlist_id: i64) -> Result<()> {
        let mut updated = playlist.clone();
        updated.metadata_mut().checksum =
            Some(chrono::Utc::now().timestamp_millis().to_string());
        self.base.repo().update(db_playlist_id, &updated).await?;
        Ok(())
    }
}

#[async_trait]
impl ItemController for PlaylistController {
    type Item = Playlist;

    fn base(&self) -> &MediaController<Playlist> {
        &self.base
    }

    async fn add(&self, item: Playlist, _suppress_matching: bool) -> Result<Playlist> {
        // playlists are never cross-provider matched
        let (stored, _created) = self.base.add_or_update(&item).await?;
        Ok(stored)
    }
}
