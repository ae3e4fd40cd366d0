//! Shared controller behaviour, generic over the entity type.
//!
//! Each controller owns one database table and one media type. The generic
//! core here implements canonical-row resolution, provider-read caching,
//! library flags and the locked add/update critical section; the per-entity
//! controllers layer reference resolution and match jobs on top.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::{Cache, DEFAULT_TTL};
use crate::compare::{
    compare_artists, compare_track, loose_compare_strings,
};
use crate::events::{EventBus, EventType};
use crate::models::{
    Album, Artist, Audiobook, Episode, ItemMapping, LibraryQuery, MediaItem, PagedItems, Playlist,
    Podcast, ProviderMapping, Radio, SearchResults, Track, TrackAlbumMapping,
};
use crate::provider::{with_provider_policy, MusicProvider, ProviderCapability, ProviderRegistry};
use crate::repository::{
    items::StoredMediaItem, Database, LoudnessRepository, MediaItemRepository,
    ProviderMappingRepository,
};
use crate::{Error, Result, DB_PROVIDER};

/// Full metadata is refetched when older than this (30 days).
pub const REFRESH_INTERVAL_SECS: i64 = 60 * 60 * 24 * 30;

/// Provider search results are cached for 7 days.
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(86_400 * 7);

/// Sanitize a search query before it reaches providers or cache keys.
#[must_use]
pub fn sanitize_query(query: &str) -> String {
    query.replace('/', " ").replace('\'', "")
}

/// Dependencies shared by all controllers; held on the root context rather
/// than in process-wide globals.
pub struct ControllerDeps {
    pub db: Database,
    pub cache: Cache,
    pub registry: Arc<ProviderRegistry>,
    pub events: EventBus,
    pub loudness: LoudnessRepository,
    /// Base url of the stream endpoint, e.g. `http://192.168.1.5:8095`.
    pub stream_base_url: String,
}

impl ControllerDeps {
    #[must_use]
    pub fn new(
        db: Database,
        cache: Cache,
        registry: Arc<ProviderRegistry>,
        events: EventBus,
        stream_base_url: String,
    ) -> Arc<Self> {
        let loudness = LoudnessRepository::new(db.pool().clone());
        Arc::new(Self {
            db,
            cache,
            registry,
            events,
            loudness,
            stream_base_url,
        })
    }
}

/// Options for [`ItemController::get`].
#[derive(Debug, Clone)]
pub struct GetOptions<T> {
    pub force_refresh: bool,
    /// Schedule the canonical write in the background and return the
    /// provider item immediately.
    pub lazy: bool,
    /// Already-fetched provider details, skipping the provider roundtrip.
    pub details: Option<T>,
    pub add_to_db: bool,
}

impl<T> Default for GetOptions<T> {
    fn default() -> Self {
        Self {
            force_refresh: false,
            lazy: true,
            details: None,
            add_to_db: true,
        }
    }
}

impl<T> GetOptions<T> {
    /// Await the canonical write and return the database entity.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            lazy: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_details(details: T) -> Self {
        Self {
            details: Some(details),
            ..Self::default()
        }
    }
}

/// Per-entity hooks the generic controller core needs: fetching from a
/// provider, picking the search bucket, duplicate matching and field merge.
#[async_trait]
pub trait LibraryEntity: StoredMediaItem {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self>;

    fn from_search_results(results: SearchResults) -> Vec<Self>;

    /// The provider's library listing for this entity type.
    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        let _ = provider;
        crate::provider::empty_stream()
    }

    /// Locate an existing canonical row this provider item duplicates,
    /// by external ids first, then name-based fuzzy compare.
    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>>;

    /// Merge entity-specific fields of `new` into the existing row.
    fn merge_entity_fields(db_item: &mut Self, new: &Self);
}

/// Generic controller core for one entity table.
pub struct MediaController<T: LibraryEntity> {
    deps: Arc<ControllerDeps>,
    repo: MediaItemRepository<T>,
    mappings: ProviderMappingRepository,
    /// Serialises the add/update critical section (match, merge, write,
    /// mapping-index rewrite) to prevent duplicate canonical rows racing.
    db_add_lock: Mutex<()>,
}

impl<T: LibraryEntity> MediaController<T> {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Self {
        let repo = MediaItemRepository::new(deps.db.pool().clone());
        let mappings = ProviderMappingRepository::new(deps.db.pool().clone());
        Self {
            deps,
            repo,
            mappings,
            db_add_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn deps(&self) -> &Arc<ControllerDeps> {
        &self.deps
    }

    #[must_use]
    pub const fn repo(&self) -> &MediaItemRepository<T> {
        &self.repo
    }

    pub async fn library_items(&self, query: &LibraryQuery) -> Result<PagedItems<T>> {
        self.repo.library_items(query).await
    }

    pub async fn get_db_item(&self, item_id: &str) -> Result<T> {
        let db_id = parse_db_id::<T>(item_id)?;
        self.repo.get_or_err(db_id).await
    }

    /// The canonical row holding a mapping for `(provider, item_id)`.
    pub async fn get_db_item_by_prov_id(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Option<T>> {
        if provider_instance_or_domain == DB_PROVIDER {
            let db_id = parse_db_id::<T>(item_id)?;
            return self.repo.get(db_id).await;
        }
        let Some(db_id) = self
            .mappings
            .get_db_id(T::MEDIA_TYPE, provider_instance_or_domain, item_id)
            .await?
        else {
            return Ok(None);
        };
        self.repo.get(db_id).await
    }

    /// Fetch the full item from the provider, fronted by the cache with
    /// singleflight so concurrent misses share one fetch.
    pub async fn get_provider_item(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
        force_refresh: bool,
    ) -> Result<T> {
        if provider_instance_or_domain == DB_PROVIDER {
            return self.get_db_item(item_id).await;
        }
        let provider = self
            .deps
            .registry
            .get(provider_instance_or_domain)
            .ok_or_else(|| {
                Error::ProviderUnavailable(format!(
                    "Provider not available: {provider_instance_or_domain}"
                ))
            })?;
        let cache_key = format!(
            "provider_item.{}.{}.{}",
            T::MEDIA_TYPE,
            provider.instance_id(),
            item_id
        );
        if force_refresh {
            self.deps.cache.invalidate(&cache_key).await;
        }
        let item_id = item_id.to_string();
        self.deps
            .cache
            .get_or_compute(&cache_key, None, DEFAULT_TTL, async move {
                with_provider_policy("get_item", || {
                    T::fetch_from_provider(provider.as_ref(), &item_id)
                })
                .await
            })
            .await
    }

    /// The add/update critical section: match against existing rows, merge,
    /// write the row and rewrite its mapping index, emit the change event.
    /// Returns the stored entity and whether a new row was created.
    pub async fn add_or_update(&self, item: &T) -> Result<(T, bool)> {
        let _guard = self.db_add_lock.lock().await;

        // resolve via the mapping index first: an exact provider-id hit
        // always wins over fuzzy matching
        let mut existing: Option<T> = None;
        for mapping in item.provider_mappings() {
            if let Some(db_id) = self
                .mappings
                .get_db_id(T::MEDIA_TYPE, &mapping.provider_instance, &mapping.item_id)
                .await?
            {
                existing = self.repo.get(db_id).await?;
                break;
            }
        }
        if existing.is_none() {
            existing = T::find_db_match(&self.repo, item).await?;
        }

        let now = chrono::Utc::now().timestamp();
        if let Some(mut db_item) = existing {
            let db_id = parse_db_id::<T>(db_item.item_id())?;
            merge_common_fields(&mut db_item, item);
            T::merge_entity_fields(&mut db_item, item);
            db_item.metadata_mut().last_refresh = Some(now);
            let stored = self.repo.update(db_id, &db_item).await?;
            tracing::debug!(name = stored.name(), db_id, media_type = %T::MEDIA_TYPE, "updated in database");
            self.deps.events.publish_obj(
                EventType::MediaItemUpdated,
                Some(stored.uri().to_string()),
                &stored,
            );
            Ok((stored, false))
        } else {
            if item.provider_mappings().is_empty() {
                return Err(Error::InvalidData(format!(
                    "{} {} has no provider mappings",
                    T::MEDIA_TYPE,
                    item.name()
                )));
            }
            let mut new_item = item.clone();
            new_item.regenerate_derived_fields();
            new_item.metadata_mut().last_refresh = Some(now);
            let stored = self.repo.insert(&new_item).await?;
            tracing::debug!(name = stored.name(), id = stored.item_id(), media_type = %T::MEDIA_TYPE, "added to database");
            self.deps.events.publish_obj(
                EventType::MediaItemAdded,
                Some(stored.uri().to_string()),
                &stored,
            );
            Ok((stored, true))
        }
    }

    /// Search the database or a provider; provider results are cached for
    /// 7 days, except filesystem providers which are never cached.
    pub async fn search(
        &self,
        search_query: &str,
        provider_instance_or_domain: &str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let query = sanitize_query(search_query);
        if provider_instance_or_domain == DB_PROVIDER {
            return self.repo.search(&query, limit).await;
        }
        let Some(provider) = self.deps.registry.get(provider_instance_or_domain) else {
            return Ok(Vec::new());
        };
        if !provider.supports(ProviderCapability::Search) {
            return Ok(Vec::new());
        }

        let fetch = {
            let provider = provider.clone();
            let query = query.clone();
            async move {
                let results = with_provider_policy("search", || {
                    provider.search(&query, &[T::MEDIA_TYPE], limit)
                })
                .await?;
                Ok(T::from_search_results(results))
            }
        };
        if provider.domain().starts_with("filesystem") {
            return fetch.await;
        }
        let cache_key = format!(
            "search.{}.{}.{}.{}",
            provider.instance_id(),
            T::MEDIA_TYPE,
            query,
            limit
        );
        self.deps
            .cache
            .get_or_compute(&cache_key, None, SEARCH_CACHE_TTL, fetch)
            .await
    }

    /// Mark the item as favourite on every provider that supports library
    /// edits and flip the local library flag.
    pub async fn add_to_library(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<()> {
        let item = match self
            .get_db_item_by_prov_id(item_id, provider_instance_or_domain)
            .await?
        {
            Some(item) => item,
            None => {
                self.get_provider_item(item_id, provider_instance_or_domain, false)
                    .await?
            }
        };
        if item.in_library() {
            return Ok(());
        }
        self.edit_library_on_providers(&item, true).await;
        if item.provider() == DB_PROVIDER {
            self.set_in_library(parse_db_id::<T>(item.item_id())?, true)
                .await?;
        }
        Ok(())
    }

    pub async fn remove_from_library(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<()> {
        let item = match self
            .get_db_item_by_prov_id(item_id, provider_instance_or_domain)
            .await?
        {
            Some(item) => item,
            None => {
                self.get_provider_item(item_id, provider_instance_or_domain, false)
                    .await?
            }
        };
        if !item.in_library() {
            return Ok(());
        }
        self.edit_library_on_providers(&item, false).await;
        if item.provider() == DB_PROVIDER {
            self.set_in_library(parse_db_id::<T>(item.item_id())?, false)
                .await?;
        }
        Ok(())
    }

    async fn edit_library_on_providers(&self, item: &T, add: bool) {
        let Some(edit_capability) = ProviderCapability::library_edit_for(T::MEDIA_TYPE) else {
            return;
        };
        for mapping in item.provider_mappings() {
            let Some(provider) = self.deps.registry.get(&mapping.provider_instance) else {
                continue;
            };
            if !provider.supports(edit_capability) {
                continue;
            }
            let result = with_provider_policy("library_edit", || async {
                if add {
                    provider.library_add(&mapping.item_id, T::MEDIA_TYPE).await
                } else {
                    provider
                        .library_remove(&mapping.item_id, T::MEDIA_TYPE)
                        .await
                }
            })
            .await;
            // one provider failing must not fail the whole operation
            if let Err(err) = result {
                tracing::warn!(
                    provider = %mapping.provider_instance,
                    item = %mapping.item_id,
                    %err,
                    "library edit failed on provider"
                );
            }
        }
    }

    /// Flip the library flag on a canonical row, with a change event.
    pub async fn set_in_library(&self, db_id: i64, in_library: bool) -> Result<()> {
        self.repo.set_in_library(db_id, in_library).await?;
        let item = self.repo.get_or_err(db_id).await?;
        self.deps.events.publish_obj(
            EventType::MediaItemUpdated,
            Some(item.uri().to_string()),
            &item,
        );
        Ok(())
    }

    /// Delete the row and its mapping index rows. References held by other
    /// entities are broken by the media-type specific controllers.
    pub async fn delete(&self, db_id: i64) -> Result<()> {
        let item = self.repo.get_or_err(db_id).await?;
        self.repo.delete(db_id).await?;
        self.deps.events.publish_obj(
            EventType::MediaItemDeleted,
            Some(item.uri().to_string()),
            &item,
        );
        tracing::debug!(db_id, media_type = %T::MEDIA_TYPE, "deleted item from database");
        Ok(())
    }

    /// Remove one provider's mappings from an item; deleting the last
    /// mapping deletes the entity.
    pub async fn remove_provider_mapping(
        &self,
        db_id: i64,
        provider_instance: &str,
    ) -> Result<()> {
        let Some(mut db_item) = self.repo.get(db_id).await? else {
            // already deleted, e.g. a racing sync
            return Ok(());
        };
        db_item
            .provider_mappings_mut()
            .retain(|mapping| mapping.provider_instance != provider_instance);
        if db_item.provider_mappings().is_empty() {
            return self.delete(db_id).await;
        }
        let stored = self.repo.update(db_id, &db_item).await?;
        tracing::debug!(provider_instance, db_id, "removed provider mapping");
        self.deps.events.publish_obj(
            EventType::MediaItemUpdated,
            Some(stored.uri().to_string()),
            &stored,
        );
        Ok(())
    }

    /// First usable `(provider_instance, item_id)` of an item: available,
    /// registered, filesystem providers first.
    #[must_use]
    pub fn preferred_provider_mapping(&self, item: &T) -> Option<(String, String)> {
        for prefer_file in [true, false] {
            for mapping in item.provider_mappings() {
                if !mapping.available {
                    continue;
                }
                if prefer_file != mapping.provider_domain.starts_with("filesystem") {
                    continue;
                }
                if self.deps.registry.get(&mapping.provider_instance).is_some() {
                    return Some((mapping.provider_instance.clone(), mapping.item_id.clone()));
                }
            }
        }
        None
    }
}

/// Entity controller surface: entity-specific `add` plus the shared `get`
/// resolution flow.
#[async_trait]
pub trait ItemController: Clone + Send + Sync + 'static {
    type Item: LibraryEntity;

    fn base(&self) -> &MediaController<Self::Item>;

    /// Add the (full) provider item to the canonical database, deduping
    /// against existing rows. With `suppress_matching` the cross-provider
    /// match pass is skipped (used by the re-entrant match path).
    async fn add(&self, item: Self::Item, suppress_matching: bool) -> Result<Self::Item>;

    /// Return (full) details for a single media item.
    ///
    /// Resolution order: canonical row (fresh enough) → provider fetch →
    /// canonical write (in the background when `lazy`).
    async fn get(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
        options: GetOptions<Self::Item>,
    ) -> Result<Self::Item> {
        let base = self.base();
        let mut force_refresh = options.force_refresh;
        let mut item_id = item_id.to_string();
        let mut provider = provider_instance_or_domain.to_string();
        // details from another db row or a bare mapping are not usable
        let details = options
            .details
            .filter(|details| details.provider() != DB_PROVIDER);

        if let Some(db_item) = base.get_db_item_by_prov_id(&item_id, &provider).await? {
            let last_refresh = db_item.metadata().last_refresh.unwrap_or(0);
            if chrono::Utc::now().timestamp() - last_refresh > REFRESH_INTERVAL_SECS {
                force_refresh = true;
            }
            if force_refresh && options.add_to_db {
                match base.preferred_provider_mapping(&db_item) {
                    Some((prov_instance, prov_item_id)) => {
                        provider = prov_instance;
                        item_id = prov_item_id;
                    }
                    // no usable provider to refresh from
                    None => return Ok(db_item),
                }
            } else {
                return Ok(db_item);
            }
        } else if provider == DB_PROVIDER {
            return Err(Error::MediaNotFound(format!(
                "{} not found in database: {item_id}",
                Self::Item::MEDIA_TYPE
            )));
        }

        let details = match details {
            Some(details) => details,
            None => {
                base.get_provider_item(&item_id, &provider, force_refresh)
                    .await?
            }
        };
        if !options.add_to_db {
            return Ok(details);
        }
        if options.lazy {
            let this = self.clone();
            let item = details.clone();
            tokio::spawn(async move {
                if let Err(err) = this.add(item, false).await {
                    tracing::warn!(%err, "background add failed");
                }
            });
            return Ok(details);
        }
        self.add(details, false).await
    }
}

fn parse_db_id<T: LibraryEntity>(item_id: &str) -> Result<i64> {
    item_id.parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid database id for {}: {item_id}",
            T::MEDIA_TYPE
        ))
    })
}

/// Merge the fields every entity shares: name, metadata, provider mappings.
fn merge_common_fields<T: LibraryEntity>(db_item: &mut T, new: &T) {
    if !new.name().is_empty() && db_item.name() != new.name() {
        db_item.set_name(new.name().to_string());
    }
    db_item.metadata_mut().update(new.metadata(), false);
    let new_mappings: Vec<ProviderMapping> = new.provider_mappings().iter().cloned().collect();
    for mapping in new_mappings {
        db_item.add_provider_mapping(mapping);
    }
}

// ---------------------------------------------------------------------------
// per-entity hook implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl LibraryEntity for Artist {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_artist(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.artists
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_artists()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        if let Some(mb_id) = &item.musicbrainz_id {
            if let Some(hit) = repo.by_musicbrainz_id(mb_id).await? {
                return Ok(Some(hit));
            }
        }
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if loose_compare_strings(&candidate.name, &item.name) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.musicbrainz_id.is_none() {
            db_item.musicbrainz_id.clone_from(&new.musicbrainz_id);
        }
    }
}

#[async_trait]
impl LibraryEntity for Album {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_album(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.albums
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_albums()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        if let Some(mb_id) = &item.musicbrainz_id {
            if let Some(hit) = repo.by_musicbrainz_id(mb_id).await? {
                return Ok(Some(hit));
            }
        }
        if let Some(upc) = &item.upc {
            if let Some(hit) = repo.by_upc(upc).await? {
                return Ok(Some(hit));
            }
        }
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if loose_compare_strings(&candidate.name, &item.name)
                && loose_compare_strings(&candidate.version, &item.version)
                && compare_artists(&candidate.artists, &item.artists, true)
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.version.is_empty() {
            db_item.version.clone_from(&new.version);
        }
        if db_item.year.is_none() {
            db_item.year = new.year;
        }
        if db_item.upc.is_none() {
            db_item.upc.clone_from(&new.upc);
        }
        if db_item.musicbrainz_id.is_none() {
            db_item.musicbrainz_id.clone_from(&new.musicbrainz_id);
        }
        if db_item.album_type == crate::models::AlbumType::Unknown {
            db_item.album_type = new.album_type;
        }
        merge_item_mappings(&mut db_item.artists, &new.artists);
    }
}

#[async_trait]
impl LibraryEntity for Track {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_track(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.tracks
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_tracks()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        if let Some(mb_id) = &item.musicbrainz_id {
            if let Some(hit) = repo.by_musicbrainz_id(mb_id).await? {
                return Ok(Some(hit));
            }
        }
        for isrc in &item.isrcs {
            if let Some(hit) = repo.by_isrc(isrc).await? {
                return Ok(Some(hit));
            }
        }
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if compare_track(&candidate, item) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.duration == 0 {
            db_item.duration = new.duration;
        }
        if db_item.version.is_empty() {
            db_item.version.clone_from(&new.version);
        }
        if db_item.musicbrainz_id.is_none() {
            db_item.musicbrainz_id.clone_from(&new.musicbrainz_id);
        }
        db_item.isrcs.extend(new.isrcs.iter().cloned());
        merge_item_mappings(&mut db_item.artists, &new.artists);
        // album appearances accumulate uniquely per (album, disc, track)
        if let Some(album) = &new.album {
            let mapping = TrackAlbumMapping {
                album: album.clone(),
                disc_number: new.disc_number,
                track_number: new.track_number,
            };
            if !db_item.albums.iter().any(|existing| {
                existing.album.uri == mapping.album.uri
                    && existing.disc_number == mapping.disc_number
                    && existing.track_number == mapping.track_number
            }) {
                db_item.albums.push(mapping);
            }
        }
        if db_item.album.is_none() {
            db_item.album.clone_from(&new.album);
            db_item.disc_number = new.disc_number;
            db_item.track_number = new.track_number;
        }
    }
}

#[async_trait]
impl LibraryEntity for Playlist {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_playlist(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.playlists
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_playlists()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        // playlists never merge across providers: identical names from two
        // services are still different playlists, so only an exact
        // name+owner pair counts
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if candidate.name == item.name && candidate.owner == item.owner {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.owner.is_empty() {
            db_item.owner.clone_from(&new.owner);
        }
        db_item.is_editable = new.is_editable;
    }
}

#[async_trait]
impl LibraryEntity for Radio {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_radio(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.radios
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_radios()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if loose_compare_strings(&candidate.name, &item.name) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(_db_item: &mut Self, _new: &Self) {}
}

#[async_trait]
impl LibraryEntity for Audiobook {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_audiobook(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.audiobooks
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_audiobooks()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            let authors_match = item.authors.is_empty()
                || candidate.authors.is_empty()
                || item.authors.iter().any(|author| {
                    candidate
                        .authors
                        .iter()
                        .any(|other| loose_compare_strings(author, other))
                });
            if loose_compare_strings(&candidate.name, &item.name) && authors_match {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.authors.is_empty() {
            db_item.authors.clone_from(&new.authors);
        }
        if db_item.narrators.is_empty() {
            db_item.narrators.clone_from(&new.narrators);
        }
        if db_item.publisher.is_none() {
            db_item.publisher.clone_from(&new.publisher);
        }
        if db_item.duration == 0 {
            db_item.duration = new.duration;
        }
        if db_item.chapters.is_empty() {
            db_item.chapters.clone_from(&new.chapters);
        }
        // resume state always reflects the latest report
        db_item.resume_position_ms = new.resume_position_ms.max(db_item.resume_position_ms);
        db_item.fully_played |= new.fully_played;
    }
}

#[async_trait]
impl LibraryEntity for Podcast {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_podcast(prov_item_id).await
    }

    fn from_search_results(results: SearchResults) -> Vec<Self> {
        results.podcasts
    }

    fn library_stream<'a>(
        provider: &'a dyn MusicProvider,
    ) -> futures::stream::BoxStream<'a, Result<Self>> {
        provider.library_podcasts()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            if loose_compare_strings(&candidate.name, &item.name) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.publisher.is_none() {
            db_item.publisher.clone_from(&new.publisher);
        }
        if new.total_episodes.is_some() {
            db_item.total_episodes = new.total_episodes;
        }
    }
}

#[async_trait]
impl LibraryEntity for Episode {
    async fn fetch_from_provider(provider: &dyn MusicProvider, prov_item_id: &str) -> Result<Self> {
        provider.get_episode(prov_item_id).await
    }

    fn from_search_results(_results: SearchResults) -> Vec<Self> {
        Vec::new()
    }

    async fn find_db_match(
        repo: &MediaItemRepository<Self>,
        item: &Self,
    ) -> Result<Option<Self>> {
        for candidate in repo.by_sort_name(&item.sort_name).await? {
            let same_podcast = match (&candidate.podcast, &item.podcast) {
                (Some(a), Some(b)) => loose_compare_strings(&a.name, &b.name),
                _ => true,
            };
            if loose_compare_strings(&candidate.name, &item.name) && same_podcast {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn merge_entity_fields(db_item: &mut Self, new: &Self) {
        if db_item.podcast.is_none() {
            db_item.podcast.clone_from(&new.podcast);
        }
        if db_item.duration == 0 {
            db_item.duration = new.duration;
        }
        if db_item.episode_number.is_none() {
            db_item.episode_number = new.episode_number;
        }
        if db_item.chapters.is_empty() {
            db_item.chapters.clone_from(&new.chapters);
        }
        db_item.resume_position_ms = new.resume_position_ms.max(db_item.resume_position_ms);
        db_item.fully_played |= new.fully_played;
    }
}

/// Union two reference lists by uri, preserving order.
pub(crate) fn merge_item_mappings(current: &mut Vec<ItemMapping>, new: &[ItemMapping]) {
    let seen: HashSet<String> = current.iter().map(|m| m.uri.clone()).collect();
    for mapping in new {
        if !seen.contains(&mapping.uri) {
            current.push(mapping.clone());
        }
    }
}
