//! Album controller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::artists::{resolve_artist_mapping, ArtistController};
use super::base::{ControllerDeps, GetOptions, ItemController, MediaController};
use crate::compare::{compare_artists, loose_compare_strings};
use crate::models::{Album, MediaItem, MediaType, Track};
use crate::provider::ProviderCapability;
use crate::repository::{MediaItemRepository, ProviderMappingRepository};
use crate::{Result, DB_PROVIDER};

#[derive(Clone)]
pub struct AlbumController {
    base: Arc<MediaController<Album>>,
    artists: Arc<ArtistController>,
    track_repo: MediaItemRepository<Track>,
    track_mappings: ProviderMappingRepository,
}

impl AlbumController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>, artists: Arc<ArtistController>) -> Arc<Self> {
        let track_repo = MediaItemRepository::new(deps.db.pool().clone());
        let track_mappings = ProviderMappingRepository::new(deps.db.pool().clone());
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
            artists,
            track_repo,
            track_mappings,
        })
    }

    /// The album's track list in disc/track order, substituting canonical
    /// rows where a provider track already maps to one.
    pub async fn album_tracks(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Track>> {
        let album = self
            .get(
                item_id,
                provider_instance_or_domain,
                GetOptions {
                    add_to_db: false,
                    ..Default::default()
                },
            )
            .await?;
        let Some((prov_instance, prov_item_id)) = self.base.preferred_provider_mapping(&album)
        else {
            return Ok(Vec::new());
        };
        let Some(provider) = self.base.deps().registry.get(&prov_instance) else {
            return Ok(Vec::new());
        };

        let mut tracks = Vec::new();
        let mut stream = provider.album_tracks(&prov_item_id);
        while let Some(track) = stream.next().await {
            let provider_track = match track {
                Ok(track) => track,
                Err(err) => {
                    tracing::warn!(%err, "skipping track from album listing");
                    continue;
                }
            };
            let mut track = provider_track.clone();
            if let Some(db_id) = self
                .track_mappings
                .get_db_id(MediaType::Track, &prov_instance, &provider_track.item_id)
                .await?
            {
                if let Some(mut db_track) = self.track_repo.get(db_id).await? {
                    // position comes from the listing, not the canonical row
                    db_track.disc_number = provider_track.disc_number;
                    db_track.track_number = provider_track.track_number;
                    track = db_track;
                }
            }
            tracks.push(track);
        }
        tracks.sort_by_key(|track| {
            (
                track.disc_number.unwrap_or(0),
                track.track_number.unwrap_or(0),
            )
        });
        Ok(tracks)
    }

    /// All versions of this album found across unique providers, excluding
    /// the album's own mappings.
    pub async fn versions(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Album>> {
        let album = self
            .get(
                item_id,
                provider_instance_or_domain,
                GetOptions {
                    add_to_db: false,
                    ..Default::default()
                },
            )
            .await?;
        let artist_name = album.artist().map(|a| a.name.clone()).unwrap_or_default();
        let search_query = format!("{artist_name} - {}", album.name());

        let mut versions: HashMap<String, Album> = HashMap::new();
        for provider in self.base.deps().registry.unique_providers() {
            let results = match self
                .base
                .search(&search_query, provider.instance_id(), 25)
                .await
            {
                Ok(results) => results,
                Err(err) => {
                    tracing::debug!(%err, provider = provider.domain(), "versions search failed");
                    continue;
                }
            };
            for candidate in results {
                if loose_compare_strings(candidate.name(), album.name())
                    && compare_artists(&candidate.artists, &album.artists, true)
                {
                    versions.insert(candidate.item_id().to_string(), candidate);
                }
            }
        }
        for mapping in album.provider_mappings() {
            versions.remove(&mapping.item_id);
        }
        Ok(versions.into_values().collect())
    }

    /// Find this canonical album on providers without a mapping and fold
    /// matches back into the row.
    pub async fn match_album(&self, db_album: &Album) {
        if db_album.provider() != DB_PROVIDER {
            return;
        }
        let artist_name = db_album.artist().map(|a| a.name.clone()).unwrap_or_default();
        let mut search_query = format!("{artist_name} - {}", db_album.name());
        if !db_album.version.is_empty() {
            search_query.push(' ');
            search_query.push_str(&db_album.version);
        }
        let known_domains: Vec<String> = db_album
            .provider_mappings()
            .iter()
            .map(|m| m.provider_domain.clone())
            .collect();

        for provider in self
            .base
            .deps()
            .registry
            .providers_supporting(ProviderCapability::Search)
        {
            if known_domains.contains(&provider.domain().to_string()) {
                continue;
            }
            let results = match self
                .base
                .search(&search_query, provider.instance_id(), 5)
                .await
            {
                Ok(results) => results,
                Err(err) => {
                    tracing::debug!(%err, provider = provider.domain(), "album match search failed");
                    continue;
                }
            };
            for candidate in results {
                if !candidate.available() {
                    continue;
                }
                if !loose_compare_strings(candidate.name(), db_album.name())
                    || !compare_artists(&candidate.artists, &db_album.artists, true)
                {
                    continue;
                }
                let full = match self
                    .base
                    .get_provider_item(candidate.item_id(), candidate.provider(), false)
                    .await
                {
                    Ok(full) => full,
                    Err(_) => candidate,
                };
                if let Err(err) = self.add(full, true).await {
                    tracing::warn!(%err, "failed to fold matched album");
                }
                break;
            }
        }
    }
}

#[async_trait]
impl ItemController for AlbumController {
    type Item = Album;

    fn base(&self) -> &MediaController<Album> {
        &self.base
    }

    async fn add(&self, mut item: Album, suppress_matching: bool) -> Result<Album> {
        // resolve artist references to canonical-backed mappings; a failing
        // artist lookup downgrades to the provider reference
        let mut resolved = Vec::with_capacity(item.artists.len());
        for artist in &item.artists {
            match resolve_artist_mapping(&self.artists, artist).await {
                Ok(mapping) => resolved.push(mapping),
                Err(err) => {
                    tracing::warn!(artist = %artist.name, %err, "could not resolve album artist");
                    resolved.push(artist.clone());
                }
            }
        }
        item.artists = resolved;

        let (stored, _created) = self.base.add_or_update(&item).await?;
        if !suppress_matching {
            let this = self.clone();
            let db_album = stored.clone();
            tokio::spawn(async move { this.match_album(&db_album).await });
        }
        Ok(stored)
    }
}
