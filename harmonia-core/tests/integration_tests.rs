//! Integration tests: controllers, sync engine, stream coordinator and
//! player manager wired against in-memory SQLite and mock providers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use harmonia_core::cache::Cache;
use harmonia_core::controllers::{ControllerDeps, GetOptions, ItemController, Music};
use harmonia_core::events::{EventBus, EventType};
use harmonia_core::models::{
    Album, Artist, ContentType, MediaItem, MediaItemType, MediaType, Player, PlayerState,
    Playlist, ProviderMapping, QueueItem, QueueOption, Radio, SearchResults, StreamDetails,
    StreamType, Track,
};
use harmonia_core::player::PlayerManager;
use harmonia_core::provider::{
    MusicProvider, PlayerProvider, ProviderCapability, ProviderRegistry,
};
use harmonia_core::repository::Database;
use harmonia_core::streams::StreamController;
use harmonia_core::sync::SyncEngine;
use harmonia_core::{Config, Error, Result, DB_PROVIDER};

// ---------------------------------------------------------------------------
// mock music provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockCatalog {
    artists: HashMap<String, Artist>,
    albums: HashMap<String, Album>,
    tracks: HashMap<String, Track>,
    playlists: HashMap<String, Playlist>,
    album_tracks: HashMap<String, Vec<String>>,
    playlist_tracks: HashMap<String, Vec<String>>,
    library_tracks: Vec<String>,
}

struct MockProvider {
    instance_id: String,
    domain: String,
    capabilities: HashSet<ProviderCapability>,
    catalog: Mutex<MockCatalog>,
    playlist_fetches: AtomicU32,
    library_delay: Option<Duration>,
    fail_streams: bool,
}

impl MockProvider {
    fn new(instance_id: &str, domain: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            domain: domain.to_string(),
            capabilities: HashSet::from([
                ProviderCapability::Search,
                ProviderCapability::LibraryTracks,
                ProviderCapability::LibraryAlbums,
                ProviderCapability::LibraryPlaylists,
                ProviderCapability::PlaylistTracksEdit,
            ]),
            catalog: Mutex::new(MockCatalog::default()),
            playlist_fetches: AtomicU32::new(0),
            library_delay: None,
            fail_streams: false,
        }
    }

    fn with_library_delay(mut self, delay: Duration) -> Self {
        self.library_delay = Some(delay);
        self
    }

    fn mapping(&self, item_id: &str) -> ProviderMapping {
        ProviderMapping::new(&self.instance_id, &self.domain, item_id)
    }

    fn artist(&self, item_id: &str, name: &str) -> Artist {
        let mut artist = Artist::new(item_id, &self.instance_id, name);
        artist.add_provider_mapping(self.mapping(item_id));
        self.catalog
            .lock()
            .expect("catalog lock")
            .artists
            .insert(item_id.to_string(), artist.clone());
        artist
    }

    fn track(&self, item_id: &str, name: &str, artist: &Artist, duration: u32) -> Track {
        let mut track = Track::new(item_id, &self.instance_id, name);
        track.duration = duration;
        track.artists = vec![artist.to_item_mapping()];
        track.add_provider_mapping(self.mapping(item_id));
        self.catalog
            .lock()
            .expect("catalog lock")
            .tracks
            .insert(item_id.to_string(), track.clone());
        track
    }

    fn set_library_tracks(&self, ids: &[&str]) {
        self.catalog.lock().expect("catalog lock").library_tracks =
            ids.iter().map(|id| (*id).to_string()).collect();
    }
}

#[async_trait]
impl MusicProvider for MockProvider {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn capabilities(&self) -> HashSet<ProviderCapability> {
        self.capabilities.clone()
    }

    async fn get_artist(&self, prov_artist_id: &str) -> Result<Artist> {
        self.catalog
            .lock()
            .expect("catalog lock")
            .artists
            .get(prov_artist_id)
            .cloned()
            .ok_or_else(|| Error::MediaNotFound(prov_artist_id.to_string()))
    }

    async fn get_album(&self, prov_album_id: &str) -> Result<Album> {
        self.catalog
            .lock()
            .expect("catalog lock")
            .albums
            .get(prov_album_id)
            .cloned()
            .ok_or_else(|| Error::MediaNotFound(prov_album_id.to_string()))
    }

    async fn get_track(&self, prov_track_id: &str) -> Result<Track> {
        self.catalog
            .lock()
            .expect("catalog lock")
            .tracks
            .get(prov_track_id)
            .cloned()
            .ok_or_else(|| Error::MediaNotFound(prov_track_id.to_string()))
    }

    async fn get_playlist(&self, prov_playlist_id: &str) -> Result<Playlist> {
        self.catalog
            .lock()
            .expect("catalog lock")
            .playlists
            .get(prov_playlist_id)
            .cloned()
            .ok_or_else(|| Error::MediaNotFound(prov_playlist_id.to_string()))
    }

    async fn search(
        &self,
        query: &str,
        media_types: &[MediaType],
        _limit: usize,
    ) -> Result<SearchResults> {
        let catalog = self.catalog.lock().expect("catalog lock");
        let mut results = SearchResults::default();
        if media_types.contains(&MediaType::Track) {
            results.tracks = catalog
                .tracks
                .values()
                .filter(|track| {
                    harmonia_core::compare::loose_compare_strings(query, &track.name)
                })
                .cloned()
                .collect();
        }
        if media_types.contains(&MediaType::Album) {
            results.albums = catalog
                .albums
                .values()
                .filter(|album| {
                    harmonia_core::compare::loose_compare_strings(query, &album.name)
                })
                .cloned()
                .collect();
        }
        if media_types.contains(&MediaType::Artist) {
            results.artists = catalog
                .artists
                .values()
                .filter(|artist| {
                    harmonia_core::compare::loose_compare_strings(query, &artist.name)
                })
                .cloned()
                .collect();
        }
        Ok(results)
    }

    fn library_tracks(&self) -> BoxStream<'_, Result<Track>> {
        let (ids, delay) = {
            let catalog = self.catalog.lock().expect("catalog lock");
            (catalog.library_tracks.clone(), self.library_delay)
        };
        Box::pin(stream::unfold(
            (self, ids.into_iter(), delay),
            |(this, mut ids, delay)| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let id = ids.next()?;
                Some((this.get_track(&id).await, (this, ids, None)))
            },
        ))
    }

    fn album_tracks(&self, prov_album_id: &str) -> BoxStream<'_, Result<Track>> {
        let ids = self
            .catalog
            .lock()
            .expect("catalog lock")
            .album_tracks
            .get(prov_album_id)
            .cloned()
            .unwrap_or_default();
        Box::pin(stream::unfold(
            (self, ids.into_iter()),
            |(this, mut ids)| async move {
                let id = ids.next()?;
                Some((this.get_track(&id).await, (this, ids)))
            },
        ))
    }

    fn playlist_tracks(&self, prov_playlist_id: &str) -> BoxStream<'_, Result<Track>> {
        self.playlist_fetches.fetch_add(1, Ordering::SeqCst);
        let ids = self
            .catalog
            .lock()
            .expect("catalog lock")
            .playlist_tracks
            .get(prov_playlist_id)
            .cloned()
            .unwrap_or_default();
        Box::pin(stream::unfold(
            (self, ids.into_iter()),
            |(this, mut ids)| async move {
                let id = ids.next()?;
                Some((this.get_track(&id).await, (this, ids)))
            },
        ))
    }

    async fn add_playlist_tracks(
        &self,
        prov_playlist_id: &str,
        track_ids_or_uris: &[String],
    ) -> Result<()> {
        let mut catalog = self.catalog.lock().expect("catalog lock");
        catalog
            .playlist_tracks
            .entry(prov_playlist_id.to_string())
            .or_default()
            .extend(track_ids_or_uris.iter().cloned());
        Ok(())
    }

    async fn get_stream_details(
        &self,
        prov_item_id: &str,
        media_type: MediaType,
    ) -> Result<StreamDetails> {
        if self.fail_streams {
            return Err(Error::ProviderUnavailable(self.instance_id.clone()));
        }
        let mut details = StreamDetails::new(
            &self.instance_id,
            prov_item_id,
            ContentType::Flac,
            StreamType::Http,
            format!("https://{}.example.com/{prov_item_id}", self.domain),
        );
        details.media_type = media_type;
        Ok(details)
    }
}

// ---------------------------------------------------------------------------
// mock player provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CommandLog {
    played_urls: Vec<(String, String)>,
    powered: Vec<(String, bool)>,
    volumes: Vec<(String, u32)>,
}

struct MockPlayerDriver {
    instance_id: String,
    log: Mutex<CommandLog>,
}

impl MockPlayerDriver {
    fn new(instance_id: &str) -> Arc<Self> {
        Arc::new(Self {
            instance_id: instance_id.to_string(),
            log: Mutex::new(CommandLog::default()),
        })
    }

    fn volumes_for(&self, player_id: &str) -> Vec<u32> {
        self.log
            .lock()
            .expect("log lock")
            .volumes
            .iter()
            .filter(|(id, _)| id == player_id)
            .map(|(_, level)| *level)
            .collect()
    }
}

#[async_trait]
impl PlayerProvider for MockPlayerDriver {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn domain(&self) -> &str {
        "mockplayer"
    }

    async fn cmd_play_url(&self, player_id: &str, url: &str) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .played_urls
            .push((player_id.to_string(), url.to_string()));
        Ok(())
    }

    async fn cmd_stop(&self, _player_id: &str) -> Result<()> {
        Ok(())
    }

    async fn cmd_play(&self, _player_id: &str) -> Result<()> {
        Ok(())
    }

    async fn cmd_pause(&self, _player_id: &str) -> Result<()> {
        Ok(())
    }

    async fn cmd_power(&self, player_id: &str, powered: bool) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .powered
            .push((player_id.to_string(), powered));
        Ok(())
    }

    async fn cmd_volume_set(&self, player_id: &str, volume_level: u32) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .volumes
            .push((player_id.to_string(), volume_level));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// fixtures
// ---------------------------------------------------------------------------

async fn setup() -> (Arc<ControllerDeps>, Arc<Music>, Arc<ProviderRegistry>) {
    let db = Database::connect_in_memory().await.expect("db");
    let registry = Arc::new(ProviderRegistry::new());
    let deps = ControllerDeps::new(
        db,
        Cache::new(),
        registry.clone(),
        EventBus::new(),
        "http://127.0.0.1:8095".to_string(),
    );
    let music = Music::new(deps.clone());
    (deps, music, registry)
}

fn beatles_track(provider: &MockProvider, item_id: &str) -> Track {
    let artist = provider.artist("beatles", "The Beatles");
    let mut track = provider.track(item_id, "Come Together", &artist, 259);
    track.isrcs.insert("GBAYE0601498".to_string());
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .tracks
        .insert(item_id.to_string(), track.clone());
    track
}

// ---------------------------------------------------------------------------
// controller behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_add_is_idempotent() {
    let (deps, music, registry) = setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    let track = beatles_track(&provider, "t1");
    registry.register(provider).await.expect("register");

    let first = music.tracks.add(track.clone(), true).await.expect("add");
    let second = music.tracks.add(track, true).await.expect("add");
    assert_eq!(first.item_id, second.item_id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(deps.db.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_cross_provider_match_merges_mappings() {
    let (deps, music, registry) = setup().await;
    let provider_a = Arc::new(MockProvider::new("mock-a", "mocka"));
    let provider_b = Arc::new(MockProvider::new("mock-b", "mockb"));
    let track_a = beatles_track(&provider_a, "a1");
    beatles_track(&provider_b, "b1");
    registry.register(provider_a).await.expect("register");
    registry.register(provider_b).await.expect("register");

    let db_track = music.tracks.add(track_a, true).await.expect("add");
    music.tracks.match_track(&db_track).await;

    let db_track = music
        .tracks
        .get(&db_track.item_id, DB_PROVIDER, GetOptions::strict())
        .await
        .expect("get");
    assert_eq!(db_track.provider_mappings.len(), 2);

    // the mapping index mirrors the row's mapping set
    let db_id: i64 = db_track.item_id.parse().expect("db id");
    let index_pairs: Vec<(String, String)> = sqlx::query_as(
        "SELECT provider_instance, provider_item_id FROM provider_mappings
         WHERE media_type = 'track' AND item_id = ?",
    )
    .bind(db_id)
    .fetch_all(deps.db.pool())
    .await
    .expect("index rows");
    let row_pairs: HashSet<(String, String)> = db_track
        .provider_mappings
        .iter()
        .map(|m| (m.provider_instance.clone(), m.item_id.clone()))
        .collect();
    assert_eq!(index_pairs.len(), 2);
    let index_set: HashSet<(String, String)> = index_pairs.into_iter().collect();
    assert_eq!(row_pairs, index_set);

    // deleting one provider's mapping leaves the row with the other
    music
        .tracks
        .base()
        .remove_provider_mapping(db_id, "mock-a")
        .await
        .expect("remove mapping");
    let remaining = music
        .tracks
        .base()
        .get_db_item(&db_id.to_string())
        .await
        .expect("row still there");
    assert_eq!(remaining.provider_mappings.len(), 1);

    // removing the last mapping deletes the entity
    music
        .tracks
        .base()
        .remove_provider_mapping(db_id, "mock-b")
        .await
        .expect("remove mapping");
    assert!(music
        .tracks
        .base()
        .get_db_item(&db_id.to_string())
        .await
        .is_err());
}

#[tokio::test]
async fn test_playlist_checksum_invalidates_track_cache() {
    let (_deps, music, registry) = setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    let artist = provider.artist("beatles", "The Beatles");
    provider.track("t1", "Come Together", &artist, 259);
    provider.track("t2", "Something", &artist, 182);

    let mut playlist = Playlist::new("p1", "mock-a", "Favourites");
    playlist.is_editable = true;
    playlist.owner = "me".to_string();
    playlist.metadata.checksum = Some("c0".to_string());
    playlist.add_provider_mapping(ProviderMapping::new("mock-a", "mocka", "p1"));
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .playlists
        .insert("p1".to_string(), playlist.clone());
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .playlist_tracks
        .insert("p1".to_string(), vec!["t1".to_string()]);
    registry.register(provider.clone()).await.expect("register");

    let db_playlist = music.playlists.add(playlist, true).await.expect("add");
    let db_id: i64 = db_playlist.item_id.parse().expect("db id");

    let tracks = music
        .playlists
        .playlist_tracks(&db_playlist.item_id, DB_PROVIDER)
        .await
        .expect("tracks");
    assert_eq!(tracks.len(), 1);
    assert_eq!(provider.playlist_fetches.load(Ordering::SeqCst), 1);

    // second listing with unchanged checksum is served from cache
    music
        .playlists
        .playlist_tracks(&db_playlist.item_id, DB_PROVIDER)
        .await
        .expect("tracks");
    assert_eq!(provider.playlist_fetches.load(Ordering::SeqCst), 1);

    // an edit bumps the checksum; the next listing bypasses the cache.
    // the edit itself reads the playlist once for duplicate detection.
    music
        .playlists
        .add_playlist_tracks(db_id, &["track://mock-a/t2".to_string()])
        .await
        .expect("edit");
    assert_eq!(provider.playlist_fetches.load(Ordering::SeqCst), 2);
    let tracks = music
        .playlists
        .playlist_tracks(&db_playlist.item_id, DB_PROVIDER)
        .await
        .expect("tracks");
    assert_eq!(provider.playlist_fetches.load(Ordering::SeqCst), 3);
    assert_eq!(tracks.len(), 2);
}

#[tokio::test]
async fn test_playlist_edit_rejected_when_not_editable() {
    let (_deps, music, registry) = setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    let mut playlist = Playlist::new("p1", "mock-a", "Editorial");
    playlist.is_editable = false;
    playlist.add_provider_mapping(ProviderMapping::new("mock-a", "mocka", "p1"));
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .playlists
        .insert("p1".to_string(), playlist.clone());
    registry.register(provider).await.expect("register");

    let db_playlist = music.playlists.add(playlist, true).await.expect("add");
    let db_id: i64 = db_playlist.item_id.parse().expect("db id");
    let result = music
        .playlists
        .add_playlist_tracks(db_id, &["track://mock-a/t1".to_string()])
        .await;
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

// ---------------------------------------------------------------------------
// sync engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_at_most_one_per_tag() {
    let (deps, music, registry) = setup().await;
    let provider = Arc::new(
        MockProvider::new("mock-a", "mocka").with_library_delay(Duration::from_millis(100)),
    );
    beatles_track(&provider, "t1");
    provider.set_library_tracks(&["t1"]);
    registry.register(provider).await.expect("register");

    let engine = SyncEngine::new(music, Duration::from_secs(3600));
    let mut events = deps.events.subscribe();

    let (first, second) = tokio::join!(
        engine.sync_library("mock-a", MediaType::Track),
        engine.sync_library("mock-a", MediaType::Track),
    );
    first.expect("sync");
    second.expect("sync");
    assert!(engine.running_jobs().is_empty());

    // exactly one start/finish status pair was emitted
    let mut status_events = 0;
    while let Ok(event) = events.try_recv() {
        if event.event_type == EventType::MusicSyncStatus {
            status_events += 1;
        }
    }
    assert_eq!(status_events, 2);
}

#[tokio::test]
async fn test_sync_reconciles_library_including_deletions() {
    let (_deps, music, registry) = setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    let artist = provider.artist("beatles", "The Beatles");
    provider.track("t1", "Come Together", &artist, 259);
    provider.track("t2", "Something", &artist, 182);
    provider.set_library_tracks(&["t1", "t2"]);
    registry.register(provider.clone()).await.expect("register");

    let engine = SyncEngine::new(music.clone(), Duration::from_secs(3600));
    engine
        .sync_library("mock-a", MediaType::Track)
        .await
        .expect("sync");

    let library = music
        .tracks
        .base()
        .repo()
        .library_ids_for_provider("mock-a")
        .await
        .expect("library ids");
    assert_eq!(library.len(), 2);

    // t2 vanished from the provider library: the next sync unflags it
    provider.set_library_tracks(&["t1"]);
    engine
        .sync_library("mock-a", MediaType::Track)
        .await
        .expect("sync");
    let library = music
        .tracks
        .base()
        .repo()
        .library_ids_for_provider("mock-a")
        .await
        .expect("library ids");
    assert_eq!(library.len(), 1);
}

// ---------------------------------------------------------------------------
// stream coordinator
// ---------------------------------------------------------------------------

fn multi_mapping_track() -> Track {
    let mut track = Track::new("1", DB_PROVIDER, "Come Together");
    track.duration = 259;
    let mut fs = ProviderMapping::new("filesystem--local", "filesystem", "a.flac");
    fs.content_type = ContentType::Flac;
    fs.sample_rate = 96_000;
    fs.bit_depth = 24;
    let mut spotify = ProviderMapping::new("spotify--1", "spotify", "sp1");
    spotify.content_type = ContentType::Ogg;
    spotify.bit_rate = 320;
    let mut qobuz = ProviderMapping::new("qobuz--1", "qobuz", "qo1");
    qobuz.content_type = ContentType::Flac;
    qobuz.sample_rate = 44_100;
    qobuz.bit_depth = 16;
    track.add_provider_mapping(fs);
    track.add_provider_mapping(spotify);
    track.add_provider_mapping(qobuz);
    track
}

#[tokio::test]
async fn test_stream_selection_prefers_file_then_lossless() {
    let (deps, _music, registry) = setup().await;
    for (instance, domain) in [
        ("filesystem--local", "filesystem"),
        ("spotify--1", "spotify"),
        ("qobuz--1", "qobuz"),
    ] {
        registry
            .register(Arc::new(MockProvider::new(instance, domain)))
            .await
            .expect("register");
    }
    let streams = StreamController::new(deps);
    let config = harmonia_core::config::PlayerConfig::default();

    let item = QueueItem::new(MediaItemType::Track(multi_mapping_track()), 259);
    let details = streams
        .get_stream_details(&item, &config)
        .await
        .expect("details");
    assert_eq!(details.provider, "filesystem--local");

    // filesystem gone: the lossless qobuz mapping beats lossy spotify
    let mut track = multi_mapping_track();
    let mut fs = ProviderMapping::new("filesystem--local", "filesystem", "a.flac");
    fs.available = false;
    track.provider_mappings.replace(fs);
    let item = QueueItem::new(MediaItemType::Track(track), 259);
    let details = streams
        .get_stream_details(&item, &config)
        .await
        .expect("details");
    assert_eq!(details.provider, "qobuz--1");
}

#[tokio::test]
async fn test_stream_selection_falls_through_failing_provider() {
    let (deps, _music, registry) = setup().await;
    let mut failing = MockProvider::new("filesystem--local", "filesystem");
    failing.fail_streams = true;
    registry.register(Arc::new(failing)).await.expect("register");
    registry
        .register(Arc::new(MockProvider::new("qobuz--1", "qobuz")))
        .await
        .expect("register");
    registry
        .register(Arc::new(MockProvider::new("spotify--1", "spotify")))
        .await
        .expect("register");

    let streams = StreamController::new(deps);
    let item = QueueItem::new(MediaItemType::Track(multi_mapping_track()), 259);
    let details = streams
        .get_stream_details(&item, &harmonia_core::config::PlayerConfig::default())
        .await
        .expect("details");
    assert_eq!(details.provider, "qobuz--1");
}

#[tokio::test]
async fn test_gain_correct_from_loudness_table() {
    let (deps, _music, registry) = setup().await;
    registry
        .register(Arc::new(MockProvider::new("qobuz--1", "qobuz")))
        .await
        .expect("register");
    deps.loudness
        .set("qobuz--1", "qo1", -9.5)
        .await
        .expect("loudness");

    let streams = StreamController::new(deps);
    let mut config = harmonia_core::config::PlayerConfig::default();
    config.target_volume = -14.0;
    config.fallback_gain_correct = -6.0;

    let mut track = Track::new("1", DB_PROVIDER, "Come Together");
    track.duration = 259;
    let mut qobuz = ProviderMapping::new("qobuz--1", "qobuz", "qo1");
    qobuz.content_type = ContentType::Flac;
    track.add_provider_mapping(qobuz);

    let item = QueueItem::new(MediaItemType::Track(track.clone()), 259);
    let details = streams
        .get_stream_details(&item, &config)
        .await
        .expect("details");
    assert_eq!(details.gain_correct, Some(-4.5));

    // no measured loudness: fall back to the configured gain
    let mut other = track;
    other.provider_mappings.clear();
    let mut mapping = ProviderMapping::new("qobuz--1", "qobuz", "unmeasured");
    mapping.content_type = ContentType::Flac;
    other.add_provider_mapping(mapping);
    let item = QueueItem::new(MediaItemType::Track(other), 259);
    let details = streams
        .get_stream_details(&item, &config)
        .await
        .expect("details");
    assert_eq!(details.gain_correct, Some(-6.0));

    // normalization off
    config.volume_normalization = false;
    let item = QueueItem::new(MediaItemType::Track(multi_mapping_track()), 259);
    let details = streams.get_stream_details(&item, &config).await;
    if let Ok(details) = details {
        assert_eq!(details.gain_correct, Some(0.0));
    }
}

// ---------------------------------------------------------------------------
// player manager & queue
// ---------------------------------------------------------------------------

struct PlayerFixture {
    music: Arc<Music>,
    manager: Arc<PlayerManager>,
    driver: Arc<MockPlayerDriver>,
    registry: Arc<ProviderRegistry>,
}

async fn player_setup() -> PlayerFixture {
    let (deps, music, registry) = setup().await;
    let driver = MockPlayerDriver::new("mockplayer");
    registry.register_player_provider(driver.clone());
    let streams = StreamController::new(deps.clone());
    let manager = PlayerManager::new(deps, music.clone(), streams, Config::default());
    PlayerFixture {
        music,
        manager,
        driver,
        registry,
    }
}

fn simple_player(player_id: &str) -> Player {
    let mut player = Player::new(player_id, "mockplayer");
    player.name = player_id.to_string();
    player.powered = true;
    player.available = true;
    player
}

#[tokio::test]
async fn test_play_media_expands_album_and_clamps_to_replace() {
    let fixture = player_setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    let artist = provider.artist("beatles", "The Beatles");
    let mut album = Album::new("album30", "mock-a", "White Album");
    album.artists = vec![artist.to_item_mapping()];
    album.add_provider_mapping(ProviderMapping::new("mock-a", "mocka", "album30"));
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .albums
        .insert("album30".to_string(), album);
    let track_ids: Vec<String> = (0..30)
        .map(|i| {
            let id = format!("t{i}");
            provider.track(&id, &format!("Track {i}"), &artist, 180 + i);
            id
        })
        .collect();
    provider
        .catalog
        .lock()
        .expect("catalog lock")
        .album_tracks
        .insert("album30".to_string(), track_ids);
    fixture.registry.register(provider).await.expect("register");

    fixture.manager.add_player(simple_player("p1")).await;
    fixture
        .manager
        .play_media(
            "p1",
            &["album://mock-a/album30".to_string()],
            QueueOption::Next,
        )
        .await
        .expect("play media");

    let queue = fixture.manager.get_queue("p1").expect("queue");
    let snapshot = queue.snapshot().await;
    // 30 items and NEXT degraded to REPLACE, so playback starts at 0
    assert_eq!(snapshot.items.len(), 30);
    assert_eq!(snapshot.cur_index, Some(0));
    assert_eq!(snapshot.state, PlayerState::Playing);
    // expansion preserved provider order
    for (index, item) in snapshot.items.iter().enumerate() {
        assert_eq!(item.media_item.name(), format!("Track {index}"));
    }
    // the driver got the first item's transport url
    let log = fixture.driver.log.lock().expect("log lock");
    assert_eq!(log.played_urls.len(), 1);
    assert!(log.played_urls[0].1.contains("/stream/p1/"));
}

#[tokio::test]
async fn test_group_power_off_cascades_to_children() {
    let fixture = player_setup().await;
    fixture.manager.add_player(simple_player("c1")).await;
    fixture.manager.add_player(simple_player("c2")).await;
    let mut group = simple_player("G");
    group.is_group = true;
    group.group_childs = vec!["c1".to_string(), "c2".to_string()];
    fixture.manager.add_player(group).await;

    fixture.manager.cmd_power_off("G").await.expect("power off");

    for player_id in ["G", "c1", "c2"] {
        let player = fixture.manager.get_player(player_id).expect("player");
        assert!(!player.powered, "{player_id} should be powered off");
        assert_eq!(player.state, PlayerState::Off);
    }
    // elapsed_time stays frozen while off
    let player = fixture.manager.get_player("c1").expect("player");
    assert_eq!(player.elapsed_time, 0);

    let log = fixture.driver.log.lock().expect("log lock");
    let off_commands: Vec<&String> = log
        .powered
        .iter()
        .filter(|(_, powered)| !powered)
        .map(|(id, _)| id)
        .collect();
    assert!(off_commands.contains(&&"c1".to_string()));
    assert!(off_commands.contains(&&"c2".to_string()));
}

#[tokio::test]
async fn test_group_volume_rescaling() {
    let fixture = player_setup().await;
    let mut c1 = simple_player("c1");
    c1.volume_level = 40;
    let mut c2 = simple_player("c2");
    c2.volume_level = 60;
    fixture.manager.add_player(c1).await;
    fixture.manager.add_player(c2).await;
    let mut group = simple_player("G");
    group.is_group = true;
    group.group_childs = vec!["c1".to_string(), "c2".to_string()];
    fixture.manager.add_player(group).await;

    // group volume is the average of its children
    assert_eq!(fixture.manager.get_player("G").expect("player").volume_level, 50);

    // same volume: no child receives a command
    fixture
        .manager
        .cmd_volume_set("G", 50)
        .await
        .expect("volume");
    assert!(fixture.driver.volumes_for("c1").is_empty());
    assert!(fixture.driver.volumes_for("c2").is_empty());

    // doubling the group volume doubles each child (clamped to 100)
    fixture
        .manager
        .cmd_volume_set("G", 100)
        .await
        .expect("volume");
    assert_eq!(fixture.driver.volumes_for("c1"), vec![80]);
    assert_eq!(fixture.driver.volumes_for("c2"), vec![100]);
}

#[tokio::test]
async fn test_group_volume_restart_from_silence() {
    let fixture = player_setup().await;
    let mut c1 = simple_player("c1");
    c1.volume_level = 0;
    let mut c2 = simple_player("c2");
    c2.volume_level = 0;
    fixture.manager.add_player(c1).await;
    fixture.manager.add_player(c2).await;
    let mut group = simple_player("G");
    group.is_group = true;
    group.group_childs = vec!["c1".to_string(), "c2".to_string()];
    fixture.manager.add_player(group).await;

    fixture
        .manager
        .cmd_volume_set("G", 30)
        .await
        .expect("volume");
    // all children were silent: each child lands on the new group volume
    assert_eq!(fixture.driver.volumes_for("c1"), vec![30]);
    assert_eq!(fixture.driver.volumes_for("c2"), vec![30]);
}

#[tokio::test]
async fn test_single_track_play_media_passthrough() {
    let fixture = player_setup().await;
    let provider = Arc::new(MockProvider::new("mock-a", "mocka"));
    beatles_track(&provider, "t1");
    fixture.registry.register(provider).await.expect("register");

    fixture.manager.add_player(simple_player("p1")).await;
    fixture
        .manager
        .play_media("p1", &["track://mock-a/t1".to_string()], QueueOption::Add)
        .await
        .expect("play media");

    let snapshot = fixture.manager.get_queue("p1").expect("queue").snapshot().await;
    assert_eq!(snapshot.items.len(), 1);
    // ADD does not start playback
    assert_eq!(snapshot.cur_index, None);
}

// ---------------------------------------------------------------------------
// radio sanity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_radio_duration_is_effectively_infinite() {
    let radio = Radio::new("r1", "builtin--1", "FM4");
    assert!(radio.duration >= 172_800);
}
