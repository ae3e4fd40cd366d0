//! Track controller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::albums::AlbumController;
use super::artists::{resolve_artist_mapping, ArtistController};
use super::base::{ControllerDeps, GetOptions, ItemController, MediaController};
use crate::compare::{compare_artists, compare_strings, compare_track, loose_compare_strings};
use crate::models::{Album, MediaItem, Track};
use crate::provider::{with_provider_policy, ProviderCapability};
use crate::{Error, Result, DB_PROVIDER};

#[derive(Clone)]
pub struct TrackController {
    base: Arc<MediaController<Track>>,
    artists: Arc<ArtistController>,
    albums: Arc<AlbumController>,
}

impl TrackController {
    #[must_use]
    pub fn new(
        deps: Arc<ControllerDeps>,
        artists: Arc<ArtistController>,
        albums: Arc<AlbumController>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
            artists,
            albums,
        })
    }

    /// `get` plus hydration: album and artist references are swapped for
    /// canonical-backed mappings, scheduling lazy adds for unknown ones.
    pub async fn get_full(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
        options: GetOptions<Track>,
    ) -> Result<Track> {
        let mut track = self
            .get(item_id, provider_instance_or_domain, options)
            .await?;
        if let Some(album_ref) = track.album.clone() {
            if album_ref.provider != DB_PROVIDER {
                match self
                    .albums
                    .get(&album_ref.item_id, &album_ref.provider, GetOptions::default())
                    .await
                {
                    Ok(album) => track.album = Some(album.to_item_mapping()),
                    Err(err) => {
                        // e.g. a playlist track with stale album details
                        tracing::warn!(album = %album_ref.uri, %err, "unable to fetch album details");
                    }
                }
            }
        }
        let mut artists = Vec::with_capacity(track.artists.len());
        for artist_ref in &track.artists {
            if artist_ref.provider == DB_PROVIDER {
                artists.push(artist_ref.clone());
                continue;
            }
            match self
                .artists
                .get(&artist_ref.item_id, &artist_ref.provider, GetOptions::default())
                .await
            {
                Ok(artist) => artists.push(artist.to_item_mapping()),
                Err(_) => artists.push(artist_ref.clone()),
            }
        }
        track.artists = artists;
        Ok(track)
    }

    /// All versions of this track found across unique providers, excluding
    /// the track's own mappings.
    pub async fn versions(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Track>> {
        let track = self
            .get(
                item_id,
                provider_instance_or_domain,
                GetOptions {
                    add_to_db: false,
                    ..Default::default()
                },
            )
            .await?;
        let artist_name = track.artist().map(|a| a.name.clone()).unwrap_or_default();
        let search_query = format!("{artist_name} - {}", track.name());

        let mut versions: HashMap<String, Track> = HashMap::new();
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
                if loose_compare_strings(candidate.name(), track.name())
                    && compare_artists(&candidate.artists, &track.artists, true)
                {
                    versions.insert(candidate.item_id().to_string(), candidate);
                }
            }
        }
        for mapping in track.provider_mappings() {
            versions.remove(&mapping.item_id);
        }
        Ok(versions.into_values().collect())
    }

    /// All albums this track appears on.
    pub async fn albums_of_track(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Album>> {
        let track = self
            .get(
                item_id,
                provider_instance_or_domain,
                GetOptions {
                    add_to_db: false,
                    ..Default::default()
                },
            )
            .await?;
        let mut albums = Vec::new();
        for album_mapping in &track.albums {
            match self
                .albums
                .get(
                    &album_mapping.album.item_id,
                    &album_mapping.album.provider,
                    GetOptions {
                        add_to_db: false,
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(album) => albums.push(album),
                Err(err) => {
                    tracing::warn!(album = %album_mapping.album.uri, %err, "album lookup failed");
                }
            }
        }
        Ok(albums)
    }

    /// Url to a short preview sample: the provider's own preview when it
    /// has one, otherwise the internal preview endpoint.
    pub async fn get_preview_url(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<String> {
        let track = self
            .base
            .get_provider_item(item_id, provider_instance_or_domain, false)
            .await?;
        if let Some(preview) = &track.metadata().preview {
            return Ok(preview.clone());
        }
        Ok(format!(
            "{}/preview/{}/{}",
            self.base.deps().stream_base_url,
            provider_instance_or_domain,
            item_id
        ))
    }

    /// A dynamic list of tracks based on the given track: any provider
    /// exposing similar-tracks wins, otherwise the operation is
    /// unsupported.
    pub async fn dynamic_tracks(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let track = self
            .get(item_id, provider_instance_or_domain, GetOptions::default())
            .await?;
        for mapping in track.provider_mappings() {
            let Some(provider) = self.base.deps().registry.get(&mapping.provider_instance) else {
                continue;
            };
            if !provider.supports(ProviderCapability::SimilarTracks) {
                continue;
            }
            let item_id = mapping.item_id.clone();
            return with_provider_policy("get_similar_tracks", || {
                provider.get_similar_tracks(&item_id, limit)
            })
            .await;
        }
        Err(Error::Unsupported(
            "No provider found that supports requesting similar tracks".to_string(),
        ))
    }

    /// Find this canonical track on providers without a mapping and fold
    /// matches back into the row. Strict name pass first, then loose.
    pub async fn match_track(&self, db_track: &Track) {
        if db_track.provider() != DB_PROVIDER {
            return;
        }
        let Some(artist_name) = db_track.artist().map(|a| a.name.clone()) else {
            return;
        };
        let known_domains: Vec<String> = db_track
            .provider_mappings()
            .iter()
            .map(|m| m.provider_domain.clone())
            .collect();
        let search_queries = [
            db_track.name().to_string(),
            format!("{artist_name} - {}", db_track.name()),
            format!("{artist_name} {}", db_track.name()),
        ];

        for provider in self
            .base
            .deps()
            .registry
            .providers_supporting(ProviderCapability::Search)
        {
            if known_domains.contains(&provider.domain().to_string()) {
                continue;
            }
            let mut matched = false;
            'queries: for search_query in &search_queries {
                let results = match self
                    .base
                    .search(search_query, provider.instance_id(), 5)
                    .await
                {
                    Ok(results) => results,
                    Err(err) => {
                        tracing::debug!(%err, provider = provider.domain(), "track match search failed");
                        continue;
                    }
                };
                for strict in [true, false] {
                    for candidate in &results {
                        if !candidate.available() {
                            continue;
                        }
                        let names_match = if strict {
                            compare_strings(candidate.name(), db_track.name())
                        } else {
                            loose_compare_strings(candidate.name(), db_track.name())
                        };
                        if !names_match || !compare_track(candidate, db_track) {
                            continue;
                        }
                        // search results are simplified objects; verify
                        // against the full provider item before folding
                        let full = match self
                            .base
                            .get_provider_item(candidate.item_id(), candidate.provider(), false)
                            .await
                        {
                            Ok(full) => full,
                            Err(_) => candidate.clone(),
                        };
                        if !compare_track(&full, db_track) {
                            continue;
                        }
                        if let Err(err) = self.add(full, true).await {
                            tracing::warn!(%err, "failed to fold matched track");
                            continue;
                        }
                        matched = true;
                        break 'queries;
                    }
                }
            }
            if !matched {
                tracing::debug!(
                    track = db_track.name(),
                    provider = provider.domain(),
                    "no match found on provider"
                );
            }
        }
    }
}

#[async_trait]
impl ItemController for TrackController {
    type Item = Track;

    fn base(&self) -> &MediaController<Track> {
        &self.base
    }

    async fn add(&self, mut item: Track, suppress_matching: bool) -> Result<Track> {
        if item.artists.is_empty() {
            return Err(Error::InvalidData(format!(
                "Track {} is missing artists",
                item.name()
            )));
        }
        // resolve artist references to canonical-backed mappings
        let mut resolved = Vec::with_capacity(item.artists.len());
        for artist in &item.artists {
            match resolve_artist_mapping(&self.artists, artist).await {
                Ok(mapping) => resolved.push(mapping),
                Err(err) => {
                    tracing::warn!(artist = %artist.name, %err, "could not resolve track artist");
                    resolved.push(artist.clone());
                }
            }
        }
        item.artists = resolved;

        // make sure the album context is a canonical row; tolerate a
        // transient missing parent
        if let Some(album_ref) = item.album.clone() {
            if album_ref.provider != DB_PROVIDER {
                match self
                    .albums
                    .base()
                    .get_db_item_by_prov_id(&album_ref.item_id, &album_ref.provider)
                    .await?
                {
                    Some(db_album) => item.album = Some(db_album.to_item_mapping()),
                    None => {
                        match self
                            .albums
                            .base()
                            .get_provider_item(&album_ref.item_id, &album_ref.provider, false)
                            .await
                        {
                            Ok(full_album) => {
                                match self.albums.add(full_album, true).await {
                                    Ok(db_album) => item.album = Some(db_album.to_item_mapping()),
                                    Err(err) => {
                                        tracing::warn!(album = %album_ref.uri, %err, "could not add track album");
                                    }
                                }
                            }
                            Err(err) => {
                                tracing::warn!(album = %album_ref.uri, %err, "could not resolve track album");
                            }
                        }
                    }
                }
            }
        }

        let (stored, _created) = self.base.add_or_update(&item).await?;
        if !suppress_matching {
            let this = self.clone();
            let db_track = stored.clone();
            tokio::spawn(async move { this.match_track(&db_track).await });
        }
        Ok(stored)
    }
}
