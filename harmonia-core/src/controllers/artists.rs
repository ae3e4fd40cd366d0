//! Artist controller.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::base::{ControllerDeps, ItemController, MediaController};
use crate::compare::{compare_strings, loose_compare_strings};
use crate::models::{Album, Artist, MediaItem, Track};
use crate::provider::ProviderCapability;
use crate::repository::{MediaItemRepository, ProviderMappingRepository};
use crate::{Error, Result, DB_PROVIDER};

#[derive(Clone)]
pub struct ArtistController {
    base: Arc<MediaController<Artist>>,
    album_repo: MediaItemRepository<Album>,
    track_repo: MediaItemRepository<Track>,
    track_mappings: ProviderMappingRepository,
}

impl ArtistController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        let album_repo = MediaItemRepository::new(deps.db.pool().clone());
        let track_repo = MediaItemRepository::new(deps.db.pool().clone());
        let track_mappings = ProviderMappingRepository::new(deps.db.pool().clone());
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
            album_repo,
            track_repo,
            track_mappings,
        })
    }

    /// All albums of this artist: canonical rows when the provider is the
    /// database, otherwise the provider listing with canonical substitution.
    pub async fn artist_albums(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Album>> {
        if provider_instance_or_domain == DB_PROVIDER {
            let artist = self.base.get_db_item(item_id).await?;
            return self.album_repo.by_data_substring(artist.uri()).await;
        }
        let Some(provider) = self.base.deps().registry.get(provider_instance_or_domain) else {
            return Ok(Vec::new());
        };
        if !provider.supports(ProviderCapability::ArtistAlbums) {
            return Ok(Vec::new());
        }
        let mut albums = Vec::new();
        let mut stream = provider.artist_albums(item_id);
        while let Some(album) = stream.next().await {
            match album {
                Ok(album) => albums.push(album),
                Err(err) => tracing::warn!(%err, "skipping album from provider listing"),
            }
        }
        Ok(albums)
    }

    /// Top tracks of this artist from the given provider.
    pub async fn artist_toptracks(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Track>> {
        if provider_instance_or_domain == DB_PROVIDER {
            let artist = self.base.get_db_item(item_id).await?;
            return self.track_repo.by_data_substring(artist.uri()).await;
        }
        let Some(provider) = self.base.deps().registry.get(provider_instance_or_domain) else {
            return Ok(Vec::new());
        };
        if !provider.supports(ProviderCapability::ArtistTopTracks) {
            return Ok(Vec::new());
        }
        let mut tracks = Vec::new();
        let mut stream = provider.artist_toptracks(item_id);
        while let Some(track) = stream.next().await {
            match track {
                Ok(mut track) => {
                    // substitute the canonical row when we already know it
                    if let Some(db_id) = self
                        .track_mappings
                        .get_db_id(
                            crate::models::MediaType::Track,
                            provider.instance_id(),
                            &track.item_id,
                        )
                        .await?
                    {
                        if let Some(db_track) = self.track_repo.get(db_id).await? {
                            track = db_track;
                        }
                    }
                    tracks.push(track);
                }
                Err(err) => tracing::warn!(%err, "skipping track from provider listing"),
            }
        }
        Ok(tracks)
    }

    /// Delete an artist. Without `recursive` the delete is refused while
    /// albums or tracks still reference the artist.
    pub async fn delete(&self, db_id: i64, recursive: bool) -> Result<()> {
        let artist = self.base.get_db_item(&db_id.to_string()).await?;
        let referencing_albums = self.album_repo.by_data_substring(artist.uri()).await?;
        let referencing_tracks = self.track_repo.by_data_substring(artist.uri()).await?;
        if !recursive && (!referencing_albums.is_empty() || !referencing_tracks.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "Artist {} still referenced by {} albums / {} tracks",
                artist.name(),
                referencing_albums.len(),
                referencing_tracks.len()
            )));
        }
        for album in referencing_albums {
            self.album_repo.delete(album.item_id().parse().map_err(|_| {
                Error::Internal("invalid database id".to_string())
            })?).await?;
        }
        for track in referencing_tracks {
            self.track_repo.delete(track.item_id().parse().map_err(|_| {
                Error::Internal("invalid database id".to_string())
            })?).await?;
        }
        self.base.delete(db_id).await
    }

    /// Find this canonical artist on providers that have no mapping yet and
    /// fold matches back into the row. Strict pass first, then loose.
    pub async fn match_artist(&self, db_artist: &Artist) {
        if db_artist.provider() != DB_PROVIDER {
            return;
        }
        let known_domains: Vec<String> = db_artist
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
                .search(db_artist.name(), provider.instance_id(), 5)
                .await
            {
                Ok(results) => results,
                Err(err) => {
                    tracing::debug!(%err, provider = provider.domain(), "artist match search failed");
                    continue;
                }
            };
            let mut matched = false;
            for strict in [true, false] {
                if matched {
                    break;
                }
                for candidate in &results {
                    let names_match = if strict {
                        compare_strings(candidate.name(), db_artist.name())
                    } else {
                        loose_compare_strings(candidate.name(), db_artist.name())
                    };
                    if !names_match || !candidate.available() {
                        continue;
                    }
                    let full = match self
                        .base
                        .get_provider_item(candidate.item_id(), candidate.provider(), false)
                        .await
                    {
                        Ok(full) => full,
                        Err(_) => candidate.clone(),
                    };
                    // fold back through add with matching suppressed to
                    // break the recursion
                    if let Err(err) = self.add(full, true).await {
                        tracing::warn!(%err, "failed to fold matched artist");
                        continue;
                    }
                    matched = true;
                    break;
                }
            }
            if !matched {
                tracing::debug!(
                    artist = db_artist.name(),
                    provider = provider.domain(),
                    "no match found on provider"
                );
            }
        }
    }
}

#[async_trait]
impl ItemController for ArtistController {
    type Item = Artist;

    fn base(&self) -> &MediaController<Artist> {
        &self.base
    }

    async fn add(&self, item: Artist, suppress_matching: bool) -> Result<Artist> {
        let (stored, _created) = self.base.add_or_update(&item).await?;
        if !suppress_matching {
            let this = self.clone();
            let db_artist = stored.clone();
            tokio::spawn(async move { this.match_artist(&db_artist).await });
        }
        Ok(stored)
    }
}

/// Convenience for the other controllers: resolve an artist reference to a
/// canonical-backed `ItemMapping`, adding the artist when needed.
pub(crate) async fn resolve_artist_mapping(
    controller: &ArtistController,
    mapping: &crate::models::ItemMapping,
) -> Result<crate::models::ItemMapping> {
    if mapping.provider == DB_PROVIDER {
        return Ok(mapping.clone());
    }
    if let Some(db_artist) = controller
        .base()
        .get_db_item_by_prov_id(&mapping.item_id, &mapping.provider)
        .await?
    {
        return Ok(db_artist.to_item_mapping());
    }
    let full = controller
        .base()
        .get_provider_item(&mapping.item_id, &mapping.provider, false)
        .await?;
    let stored = controller.add(full, true).await?;
    Ok(stored.to_item_mapping())
}
