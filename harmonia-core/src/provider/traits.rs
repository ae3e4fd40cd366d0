//! Core provider interfaces.
//!
//! Every operation has a default "unsupported" implementation so a provider
//! only implements what it declares in its capability set. Library and
//! track listings are lazy streams: finite, not restartable, drivable to
//! completion under cancellation.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use super::capability::ProviderCapability;
use crate::config::ConfigEntry;
use crate::models::{
    Album, Artist, Audiobook, BrowseFolder, Episode, MediaType, Playlist, Podcast, Player, Radio,
    SearchResults, StreamDetails, Track,
};
use crate::{Error, Result};

/// An empty lazy sequence, for operations a provider does not implement.
#[must_use]
pub fn empty_stream<'a, T: Send + 'a>() -> BoxStream<'a, Result<T>> {
    Box::pin(stream::empty())
}

/// Result of resolving an image path through a provider.
pub enum ImageResolution {
    /// Publicly reachable url.
    Url(String),
    /// Raw image bytes.
    Bytes(Vec<u8>),
}

fn unsupported<T>(domain: &str, operation: &str) -> Result<T> {
    Err(Error::Unsupported(format!(
        "{domain} does not support {operation}"
    )))
}

/// A music source backend: streaming service, media server or local
/// filesystem.
///
/// `instance_id` is the stable configuration-assigned id of one configured
/// account; `domain` names the provider family. Multiple instances may
/// share a domain.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn instance_id(&self) -> &str;
    fn domain(&self) -> &str;
    fn capabilities(&self) -> HashSet<ProviderCapability>;

    /// Config entries this provider exposes to the configuration store.
    fn config_entries(&self) -> Vec<ConfigEntry> {
        Vec::new()
    }

    /// Whether the provider can currently serve requests. Flipped to false
    /// on login failure until the instance is reloaded.
    fn is_available(&self) -> bool {
        true
    }

    // lifecycle

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Stop then start.
    async fn reload(&self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    // single item lookups

    async fn get_artist(&self, _prov_artist_id: &str) -> Result<Artist> {
        unsupported(self.domain(), "get_artist")
    }

    async fn get_album(&self, _prov_album_id: &str) -> Result<Album> {
        unsupported(self.domain(), "get_album")
    }

    async fn get_track(&self, _prov_track_id: &str) -> Result<Track> {
        unsupported(self.domain(), "get_track")
    }

    async fn get_playlist(&self, _prov_playlist_id: &str) -> Result<Playlist> {
        unsupported(self.domain(), "get_playlist")
    }

    async fn get_radio(&self, _prov_radio_id: &str) -> Result<Radio> {
        unsupported(self.domain(), "get_radio")
    }

    async fn get_audiobook(&self, _prov_audiobook_id: &str) -> Result<Audiobook> {
        unsupported(self.domain(), "get_audiobook")
    }

    async fn get_podcast(&self, _prov_podcast_id: &str) -> Result<Podcast> {
        unsupported(self.domain(), "get_podcast")
    }

    async fn get_episode(&self, _prov_episode_id: &str) -> Result<Episode> {
        unsupported(self.domain(), "get_episode")
    }

    // library listings (lazy)

    fn library_artists(&self) -> BoxStream<'_, Result<Artist>> {
        empty_stream()
    }

    fn library_albums(&self) -> BoxStream<'_, Result<Album>> {
        empty_stream()
    }

    fn library_tracks(&self) -> BoxStream<'_, Result<Track>> {
        empty_stream()
    }

    fn library_playlists(&self) -> BoxStream<'_, Result<Playlist>> {
        empty_stream()
    }

    fn library_radios(&self) -> BoxStream<'_, Result<Radio>> {
        empty_stream()
    }

    fn library_audiobooks(&self) -> BoxStream<'_, Result<Audiobook>> {
        empty_stream()
    }

    fn library_podcasts(&self) -> BoxStream<'_, Result<Podcast>> {
        empty_stream()
    }

    // child listings (lazy)

    fn album_tracks(&self, _prov_album_id: &str) -> BoxStream<'_, Result<Track>> {
        empty_stream()
    }

    fn playlist_tracks(&self, _prov_playlist_id: &str) -> BoxStream<'_, Result<Track>> {
        empty_stream()
    }

    fn podcast_episodes(&self, _prov_podcast_id: &str) -> BoxStream<'_, Result<Episode>> {
        empty_stream()
    }

    fn artist_albums(&self, _prov_artist_id: &str) -> BoxStream<'_, Result<Album>> {
        empty_stream()
    }

    fn artist_toptracks(&self, _prov_artist_id: &str) -> BoxStream<'_, Result<Track>> {
        empty_stream()
    }

    // search & similar

    async fn search(
        &self,
        _query: &str,
        _media_types: &[MediaType],
        _limit: usize,
    ) -> Result<SearchResults> {
        unsupported(self.domain(), "search")
    }

    async fn get_similar_tracks(&self, _prov_track_id: &str, _limit: usize) -> Result<Vec<Track>> {
        unsupported(self.domain(), "get_similar_tracks")
    }

    // library edit

    async fn library_add(&self, _prov_item_id: &str, _media_type: MediaType) -> Result<bool> {
        Ok(false)
    }

    async fn library_remove(&self, _prov_item_id: &str, _media_type: MediaType) -> Result<bool> {
        Ok(false)
    }

    // playlist edit

    async fn add_playlist_tracks(
        &self,
        _prov_playlist_id: &str,
        _track_ids_or_uris: &[String],
    ) -> Result<()> {
        unsupported(self.domain(), "add_playlist_tracks")
    }

    async fn remove_playlist_tracks(
        &self,
        _prov_playlist_id: &str,
        _track_ids_or_uris: &[String],
    ) -> Result<()> {
        unsupported(self.domain(), "remove_playlist_tracks")
    }

    async fn create_playlist(&self, _name: &str) -> Result<Playlist> {
        unsupported(self.domain(), "create_playlist")
    }

    // streaming

    async fn get_stream_details(
        &self,
        _prov_item_id: &str,
        _media_type: MediaType,
    ) -> Result<StreamDetails> {
        unsupported(self.domain(), "get_stream_details")
    }

    /// Resolve an image path (as stored in item metadata) to bytes or url.
    async fn resolve_image(&self, path: &str) -> Result<ImageResolution> {
        Ok(ImageResolution::Url(path.to_string()))
    }

    // browse

    async fn browse(&self, _path: &str) -> Result<BrowseFolder> {
        unsupported(self.domain(), "browse")
    }

    /// Progress callback: an item finished (or progressed) on a player.
    /// Providers use this to sync resume positions and play counts.
    async fn on_played(
        &self,
        _media_type: MediaType,
        _prov_item_id: &str,
        _fully_played: bool,
        _position_secs: u32,
    ) -> Result<()> {
        Ok(())
    }
}

/// A player backend driving one or more network players.
#[async_trait]
pub trait PlayerProvider: Send + Sync {
    fn instance_id(&self) -> &str;
    fn domain(&self) -> &str;

    /// Load and play the given transport url on the player.
    async fn cmd_play_url(&self, player_id: &str, url: &str) -> Result<()>;

    async fn cmd_stop(&self, player_id: &str) -> Result<()>;

    /// Resume from paused.
    async fn cmd_play(&self, player_id: &str) -> Result<()>;

    async fn cmd_pause(&self, player_id: &str) -> Result<()>;

    async fn cmd_power(&self, _player_id: &str, _powered: bool) -> Result<()> {
        Ok(())
    }

    async fn cmd_volume_set(&self, _player_id: &str, _volume_level: u32) -> Result<()> {
        Ok(())
    }

    async fn cmd_volume_mute(&self, _player_id: &str, _muted: bool) -> Result<()> {
        Ok(())
    }

    async fn cmd_seek(&self, player_id: &str, _position_secs: u32) -> Result<()> {
        unsupported(self.domain(), &format!("cmd_seek({player_id})"))
    }

    /// Ask the driver for fresh player state (players with `should_poll`).
    async fn poll_player(&self, player_id: &str) -> Result<Player> {
        unsupported(self.domain(), &format!("poll_player({player_id})"))
    }

    /// Hand the next item's url to the player ahead of time for gapless or
    /// crossfade transitions. Drivers without that capability ignore it.
    async fn cmd_prefetch_next(&self, _player_id: &str, _url: &str) -> Result<()> {
        Ok(())
    }
}
