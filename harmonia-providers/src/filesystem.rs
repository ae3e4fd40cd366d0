//! Local filesystem music provider.
//!
//! Assumes music is stored as `<artist>/<album>/<track.ext>`; item ids are
//! paths relative to the music directory. Tags are read with `lofty` on
//! the blocking pool, with a filename fallback when a file carries none.
//! Playlists are `.m3u` files; entries may be plain paths or foreign
//! `track://provider/id` uris, which are kept verbatim.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::read_from_path;
use lofty::tag::{Accessor, ItemKey};

use harmonia_core::config::{ConfigEntry, ConfigEntryType};
use harmonia_core::models::{
    Album, Artist, BrowseFolder, ContentType, ItemMapping, MediaItem, MediaType, Playlist,
    ProviderMapping, StreamDetails, StreamType, Track,
};
use harmonia_core::provider::{MusicProvider, ProviderCapability};
use harmonia_core::uri::create_uri;
use harmonia_core::{Error, Result};

pub const DOMAIN: &str = "filesystem";

const AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "ogg", "oga", "opus", "m4a", "mp4", "aac", "wav", "aiff", "aif", "wma", "dsf",
];

pub struct FilesystemProvider {
    instance_id: String,
    music_dir: PathBuf,
    playlists_dir: Option<PathBuf>,
}

impl FilesystemProvider {
    pub fn new(
        instance_id: impl Into<String>,
        music_dir: impl Into<PathBuf>,
        playlists_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let music_dir = music_dir.into();
        if !music_dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Music directory does not exist: {}",
                music_dir.display()
            )));
        }
        let playlists_dir = playlists_dir.filter(|dir| dir.is_dir());
        Ok(Self {
            instance_id: instance_id.into(),
            music_dir,
            playlists_dir,
        })
    }

    fn abs_path(&self, prov_item_id: &str) -> PathBuf {
        self.music_dir.join(prov_item_id)
    }

    fn rel_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.music_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn playlist_path(&self, prov_item_id: &str) -> Result<PathBuf> {
        let dir = self
            .playlists_dir
            .as_ref()
            .ok_or_else(|| Error::Unsupported("No playlists directory configured".to_string()))?;
        Ok(dir.join(prov_item_id))
    }

    fn make_artist(&self, dir_name: &str) -> Artist {
        let mut artist = Artist::new(dir_name, &self.instance_id, dir_name);
        artist.add_provider_mapping(ProviderMapping::new(&self.instance_id, DOMAIN, dir_name));
        artist
    }

    fn make_album(&self, rel_path: &str) -> Result<Album> {
        let (artist_dir, album_dir) = rel_path
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidData(format!("Not an album path: {rel_path}")))?;
        let (name, version) = parse_title_and_version(album_dir);
        let mut album = Album::new(rel_path, &self.instance_id, &name);
        album.version = version;
        album.artists = vec![self.make_artist(artist_dir).to_item_mapping()];
        album.add_provider_mapping(ProviderMapping::new(&self.instance_id, DOMAIN, rel_path));
        Ok(album)
    }

    async fn parse_track(&self, rel_path: &str) -> Result<Track> {
        let abs = self.abs_path(rel_path);
        if !abs.is_file() {
            return Err(Error::MediaNotFound(format!(
                "Track does not exist: {rel_path}"
            )));
        }
        let tags = {
            let abs = abs.clone();
            // tag parsing is blocking work, keep it off the event loop
            tokio::task::spawn_blocking(move || read_tags(&abs))
                .await
                .map_err(|err| Error::Internal(format!("tag reader task failed: {err}")))?
        };

        let file_stem = abs
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut path_parts = rel_path.rsplit('/').skip(1);
        let album_dir = path_parts.next();
        let artist_dir = path_parts.next();

        let (fallback_name, fallback_number) = parse_track_filename(&file_stem);
        let tags = tags.unwrap_or_default();
        let name = if tags.title.is_empty() {
            fallback_name
        } else {
            tags.title.clone()
        };
        let mut track = Track::new(rel_path, &self.instance_id, &name);
        track.duration = tags.duration_secs;
        track.track_number = tags.track_number.or(fallback_number);
        track.disc_number = tags.disc_number;

        let artist_names: Vec<String> = if tags.artists.is_empty() {
            artist_dir.map(|a| vec![a.to_string()]).unwrap_or_default()
        } else {
            tags.artists
        };
        track.artists = artist_names
            .iter()
            .map(|artist| self.make_artist(artist).to_item_mapping())
            .collect();

        if let Some(album_dir) = album_dir {
            let album_rel = rel_path
                .rsplit_once('/')
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_default();
            let album_name = if tags.album.is_empty() {
                parse_title_and_version(album_dir).0
            } else {
                tags.album.clone()
            };
            track.album = Some(ItemMapping {
                media_type: MediaType::Album,
                item_id: album_rel.clone(),
                provider: self.instance_id.clone(),
                name: album_name.clone(),
                sort_name: harmonia_core::compare::create_sort_name(&album_name),
                uri: create_uri(MediaType::Album, &self.instance_id, &album_rel),
                version: String::new(),
            });
        }

        let content_type = abs
            .extension()
            .map(|ext| ContentType::from_extension(&ext.to_string_lossy()))
            .unwrap_or_default();
        let mut mapping = ProviderMapping::new(&self.instance_id, DOMAIN, rel_path);
        mapping.content_type = content_type;
        if tags.sample_rate > 0 {
            mapping.sample_rate = tags.sample_rate;
        }
        if tags.bit_depth > 0 {
            mapping.bit_depth = tags.bit_depth;
        }
        if tags.bit_rate > 0 {
            mapping.bit_rate = tags.bit_rate;
        }
        mapping.details = Some(abs.to_string_lossy().to_string());
        track.add_provider_mapping(mapping);
        Ok(track)
    }

    fn list_artist_dirs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.music_dir) else {
            tracing::error!(dir = %self.music_dir.display(), "music directory not readable");
            return Vec::new();
        };
        let mut dirs: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        dirs.sort();
        dirs
    }

    fn list_album_dirs(&self, artist_dir: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.music_dir.join(artist_dir)) else {
            return Vec::new();
        };
        let mut dirs: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| format!("{artist_dir}/{}", entry.file_name().to_string_lossy()))
            .collect();
        dirs.sort();
        dirs
    }

    fn list_track_files(&self, dir: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(dir)
            .into_iter()
            .flatten()
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| {
                        AUDIO_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str())
                    })
            })
            .map(|entry| self.rel_id(entry.path()))
            .collect();
        files.sort();
        files
    }

    async fn read_playlist(&self, prov_item_id: &str) -> Result<Playlist> {
        let path = self.playlist_path(prov_item_id)?;
        if !path.is_file() {
            return Err(Error::MediaNotFound(format!(
                "Playlist does not exist: {prov_item_id}"
            )));
        }
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| prov_item_id.to_string());
        let mut playlist = Playlist::new(prov_item_id, &self.instance_id, &name);
        playlist.owner = "disk".to_string();
        playlist.is_editable = true;
        let mtime = tokio::fs::metadata(&path)
            .await?
            .modified()
            .ok()
            .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |duration| duration.as_secs());
        playlist.metadata_mut().checksum = Some(mtime.to_string());
        playlist.add_provider_mapping(ProviderMapping::new(
            &self.instance_id,
            DOMAIN,
            prov_item_id,
        ));
        Ok(playlist)
    }
}

#[async_trait]
impl MusicProvider for FilesystemProvider {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn domain(&self) -> &str {
        DOMAIN
    }

    fn capabilities(&self) -> HashSet<ProviderCapability> {
        HashSet::from([
            ProviderCapability::LibraryArtists,
            ProviderCapability::LibraryAlbums,
            ProviderCapability::LibraryTracks,
            ProviderCapability::LibraryPlaylists,
            ProviderCapability::ArtistAlbums,
            ProviderCapability::PlaylistTracksEdit,
            ProviderCapability::PlaylistCreate,
            ProviderCapability::Browse,
        ])
    }

    fn config_entries(&self) -> Vec<ConfigEntry> {
        vec![
            ConfigEntry::new("music_dir", ConfigEntryType::String).required(),
            ConfigEntry::new("playlists_dir", ConfigEntryType::String),
        ]
    }

    async fn get_artist(&self, prov_artist_id: &str) -> Result<Artist> {
        if !self.abs_path(prov_artist_id).is_dir() {
            return Err(Error::MediaNotFound(format!(
                "Artist does not exist: {prov_artist_id}"
            )));
        }
        Ok(self.make_artist(prov_artist_id))
    }

    async fn get_album(&self, prov_album_id: &str) -> Result<Album> {
        if !self.abs_path(prov_album_id).is_dir() {
            return Err(Error::MediaNotFound(format!(
                "Album does not exist: {prov_album_id}"
            )));
        }
        self.make_album(prov_album_id)
    }

    async fn get_track(&self, prov_track_id: &str) -> Result<Track> {
        self.parse_track(prov_track_id).await
    }

    async fn get_playlist(&self, prov_playlist_id: &str) -> Result<Playlist> {
        self.read_playlist(prov_playlist_id).await
    }

    fn library_artists(&self) -> BoxStream<'_, Result<Artist>> {
        let artists: Vec<Result<Artist>> = self
            .list_artist_dirs()
            .into_iter()
            .map(|dir| Ok(self.make_artist(&dir)))
            .collect();
        Box::pin(stream::iter(artists))
    }

    fn library_albums(&self) -> BoxStream<'_, Result<Album>> {
        let albums: Vec<Result<Album>> = self
            .list_artist_dirs()
            .into_iter()
            .flat_map(|artist_dir| self.list_album_dirs(&artist_dir))
            .map(|album_dir| self.make_album(&album_dir))
            .collect();
        Box::pin(stream::iter(albums))
    }

    fn library_tracks(&self) -> BoxStream<'_, Result<Track>> {
        let files = self.list_track_files(&self.music_dir);
        Box::pin(stream::unfold(
            (self, files.into_iter()),
            |(this, mut files)| async move {
                let rel_path = files.next()?;
                let track = this.parse_track(&rel_path).await;
                Some((track, (this, files)))
            },
        ))
    }

    fn library_playlists(&self) -> BoxStream<'_, Result<Playlist>> {
        let Some(playlists_dir) = self.playlists_dir.clone() else {
            return harmonia_core::provider::empty_stream();
        };
        let names: Vec<String> = std::fs::read_dir(&playlists_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.path().is_file())
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .filter(|name| {
                        !name.starts_with('.') && name.to_lowercase().ends_with(".m3u")
                    })
                    .collect()
            })
            .unwrap_or_default();
        Box::pin(stream::unfold(
            (self, names.into_iter()),
            |(this, mut names)| async move {
                let name = names.next()?;
                let playlist = this.read_playlist(&name).await;
                Some((playlist, (this, names)))
            },
        ))
    }

    fn album_tracks(&self, prov_album_id: &str) -> BoxStream<'_, Result<Track>> {
        let files = self.list_track_files(&self.abs_path(prov_album_id));
        Box::pin(stream::unfold(
            (self, files.into_iter()),
            |(this, mut files)| async move {
                let rel_path = files.next()?;
                let track = this.parse_track(&rel_path).await;
                Some((track, (this, files)))
            },
        ))
    }

    fn artist_albums(&self, prov_artist_id: &str) -> BoxStream<'_, Result<Album>> {
        let albums: Vec<Result<Album>> = self
            .list_album_dirs(prov_artist_id)
            .into_iter()
            .map(|album_dir| self.make_album(&album_dir))
            .collect();
        Box::pin(stream::iter(albums))
    }

    fn playlist_tracks(&self, prov_playlist_id: &str) -> BoxStream<'_, Result<Track>> {
        let prov_playlist_id = prov_playlist_id.to_string();
        Box::pin(
            stream::once(async move {
                let path = self.playlist_path(&prov_playlist_id)?;
                let content = tokio::fs::read_to_string(&path).await?;
                let mut tracks = Vec::new();
                for line in parse_m3u(&content) {
                    match self.resolve_playlist_entry(&line).await {
                        Ok(track) => tracks.push(Ok(track)),
                        Err(err) => {
                            tracing::warn!(entry = %line, %err, "skipping playlist entry");
                        }
                    }
                }
                Ok::<_, Error>(stream::iter(tracks))
            })
            .map(|result| match result {
                Ok(inner) => inner.boxed(),
                Err(err) => stream::once(async move { Err(err) }).boxed(),
            })
            .flatten(),
        )
    }

    async fn add_playlist_tracks(
        &self,
        prov_playlist_id: &str,
        track_ids_or_uris: &[String],
    ) -> Result<()> {
        let path = self.playlist_path(prov_playlist_id)?;
        let mut content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for entry in track_ids_or_uris {
            content.push_str(entry);
            content.push('\n');
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn remove_playlist_tracks(
        &self,
        prov_playlist_id: &str,
        track_ids_or_uris: &[String],
    ) -> Result<()> {
        let path = self.playlist_path(prov_playlist_id)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let remaining: Vec<&str> = content
            .lines()
            .filter(|line| !track_ids_or_uris.iter().any(|removed| removed == line))
            .collect();
        tokio::fs::write(&path, remaining.join("\n") + "\n").await?;
        Ok(())
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let file_name = format!("{name}.m3u");
        let path = self.playlist_path(&file_name)?;
        if path.exists() {
            return Err(Error::InvalidInput(format!(
                "Playlist already exists: {name}"
            )));
        }
        tokio::fs::write(&path, "").await?;
        self.read_playlist(&file_name).await
    }

    async fn get_stream_details(
        &self,
        prov_item_id: &str,
        media_type: MediaType,
    ) -> Result<StreamDetails> {
        let abs = self.abs_path(prov_item_id);
        if !abs.is_file() {
            return Err(Error::MediaNotFound(format!(
                "File does not exist: {prov_item_id}"
            )));
        }
        let content_type = abs
            .extension()
            .map(|ext| ContentType::from_extension(&ext.to_string_lossy()))
            .unwrap_or_default();
        let mut details = StreamDetails::new(
            &self.instance_id,
            prov_item_id,
            content_type,
            StreamType::File,
            abs.to_string_lossy().to_string(),
        );
        details.media_type = media_type;
        details.size = tokio::fs::metadata(&abs).await.ok().map(|meta| meta.len());
        details.direct = true;
        Ok(details)
    }

    async fn resolve_image(
        &self,
        path: &str,
    ) -> Result<harmonia_core::provider::ImageResolution> {
        let abs = self.abs_path(path);
        if !abs.is_file() {
            return Err(Error::MediaNotFound(format!("Image not found: {path}")));
        }
        let bytes = tokio::fs::read(&abs).await?;
        Ok(harmonia_core::provider::ImageResolution::Bytes(bytes))
    }

    async fn browse(&self, path: &str) -> Result<BrowseFolder> {
        let abs = if path.is_empty() {
            self.music_dir.clone()
        } else {
            self.abs_path(path)
        };
        if !abs.is_dir() {
            return Err(Error::MediaNotFound(format!(
                "Folder does not exist: {path}"
            )));
        }
        let name = abs
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "Music".to_string());
        let mut folder = BrowseFolder::new(path, &self.instance_id, &name);
        let mut items = Vec::new();
        for entry in std::fs::read_dir(&abs)?.flatten() {
            let entry_path = entry.path();
            let rel = self.rel_id(&entry_path);
            if entry_path.is_dir() {
                let sub_name = entry.file_name().to_string_lossy().to_string();
                items.push(harmonia_core::models::MediaItemType::Folder(
                    BrowseFolder::new(&rel, &self.instance_id, &sub_name),
                ));
            } else if entry_path.extension().is_some_and(|ext| {
                AUDIO_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str())
            }) {
                items.push(harmonia_core::models::MediaItemType::Track(
                    self.parse_track(&rel).await?,
                ));
            }
        }
        folder.items = Some(items);
        Ok(folder)
    }
}

impl FilesystemProvider {
    /// A playlist entry is either a foreign uri (kept as a bare reference)
    /// or a path relative to the music directory.
    async fn resolve_playlist_entry(&self, entry: &str) -> Result<Track> {
        if entry.contains("://") {
            let (media_type, provider, item_id) = harmonia_core::uri::parse_uri(entry)?;
            if media_type != MediaType::Track {
                return Err(Error::InvalidData(format!(
                    "Unsupported playlist entry: {entry}"
                )));
            }
            let name = item_id
                .rsplit('/')
                .next()
                .unwrap_or(&item_id)
                .to_string();
            let mut track = Track::new(&item_id, &provider, &name);
            track.add_provider_mapping(ProviderMapping::new(&provider, &provider, &item_id));
            return Ok(track);
        }
        self.parse_track(entry).await
    }
}

#[derive(Debug, Default, Clone)]
struct FileTags {
    title: String,
    artists: Vec<String>,
    album: String,
    track_number: Option<u32>,
    disc_number: Option<u32>,
    duration_secs: u32,
    sample_rate: u32,
    bit_depth: u32,
    bit_rate: u32,
}

fn read_tags(path: &Path) -> Option<FileTags> {
    let tagged_file = match read_from_path(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "unable to read tags");
            return None;
        }
    };
    let properties = tagged_file.properties();
    let mut tags = FileTags {
        duration_secs: properties.duration().as_secs() as u32,
        sample_rate: properties.sample_rate().unwrap_or(0),
        bit_depth: u32::from(properties.bit_depth().unwrap_or(0)),
        bit_rate: properties.audio_bitrate().unwrap_or(0),
        ..Default::default()
    };
    if let Some(tag) = tagged_file.primary_tag() {
        tags.title = tag.title().map(|title| title.to_string()).unwrap_or_default();
        tags.album = tag.album().map(|album| album.to_string()).unwrap_or_default();
        tags.track_number = tag.track();
        tags.disc_number = tag.disk();
        if let Some(artist) = tag.artist() {
            tags.artists = artist
                .split(';')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect();
        }
        if tags.artists.is_empty() {
            if let Some(album_artist) = tag.get_string(&ItemKey::AlbumArtist) {
                tags.artists = vec![album_artist.to_string()];
            }
        }
    }
    Some(tags)
}

/// Split `"Name (Version)"` into name and version.
fn parse_title_and_version(raw: &str) -> (String, String) {
    if let Some((name, rest)) = raw.rsplit_once(" (") {
        if let Some(version) = rest.strip_suffix(')') {
            return (name.trim().to_string(), version.to_string());
        }
    }
    (raw.trim().to_string(), String::new())
}

/// Parse `"01 - Name"` style filenames into (name, track number).
fn parse_track_filename(stem: &str) -> (String, Option<u32>) {
    if let Some((number, name)) = stem.split_once(" - ") {
        if let Ok(number) = number.trim().parse::<u32>() {
            return (name.trim().to_string(), Some(number));
        }
    }
    (stem.to_string(), None)
}

/// Playlist lines, comments and blanks stripped.
fn parse_m3u(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup_library() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let album = dir.path().join("The Beatles/Abbey Road (Remastered)");
        fs::create_dir_all(&album).expect("mkdirs");
        fs::write(album.join("01 - Come Together.mp3"), b"not really audio").expect("write");
        fs::write(album.join("02 - Something.mp3"), b"not really audio").expect("write");
        let playlists = dir.path().join("playlists");
        fs::create_dir_all(&playlists).expect("mkdirs");
        fs::write(
            playlists.join("roadtrip.m3u"),
            "#EXTM3U\nThe Beatles/Abbey Road (Remastered)/01 - Come Together.mp3\ntrack://spotify/abc123\n",
        )
        .expect("write");
        dir
    }

    fn provider(dir: &tempfile::TempDir) -> FilesystemProvider {
        FilesystemProvider::new(
            "filesystem--test",
            dir.path(),
            Some(dir.path().join("playlists")),
        )
        .expect("provider")
    }

    #[tokio::test]
    async fn test_library_listing() {
        let dir = setup_library();
        let provider = provider(&dir);

        let artists: Vec<_> = provider.library_artists().collect().await;
        assert_eq!(artists.len(), 2); // "The Beatles" + "playlists" dir
        let albums: Vec<_> = provider
            .library_albums()
            .filter_map(|album| async { album.ok() })
            .collect()
            .await;
        assert!(albums
            .iter()
            .any(|album| album.name == "Abbey Road" && album.version == "Remastered"));
    }

    #[tokio::test]
    async fn test_track_from_filename_fallback() {
        let dir = setup_library();
        let provider = provider(&dir);
        let track = provider
            .get_track("The Beatles/Abbey Road (Remastered)/01 - Come Together.mp3")
            .await
            .unwrap();
        // no real tags in the fixture, the filename wins
        assert_eq!(track.name, "Come Together");
        assert_eq!(track.track_number, Some(1));
        assert_eq!(track.artists[0].name, "The Beatles");
        assert!(track.album.is_some());
        let mapping = track.provider_mappings.iter().next().unwrap();
        assert_eq!(mapping.content_type, ContentType::Mp3);
    }

    #[tokio::test]
    async fn test_playlist_roundtrip_and_foreign_uris() {
        let dir = setup_library();
        let provider = provider(&dir);

        let playlist = provider.get_playlist("roadtrip.m3u").await.unwrap();
        assert!(playlist.is_editable);
        assert!(playlist.metadata.checksum.is_some());

        let tracks: Vec<_> = provider
            .playlist_tracks("roadtrip.m3u")
            .filter_map(|track| async { track.ok() })
            .collect()
            .await;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].provider, "spotify");

        // foreign uris are stored verbatim
        provider
            .add_playlist_tracks("roadtrip.m3u", &["track://qobuz/xyz".to_string()])
            .await
            .unwrap();
        let content =
            fs::read_to_string(dir.path().join("playlists/roadtrip.m3u")).expect("read");
        assert!(content.contains("track://qobuz/xyz"));

        provider
            .remove_playlist_tracks("roadtrip.m3u", &["track://qobuz/xyz".to_string()])
            .await
            .unwrap();
        let content =
            fs::read_to_string(dir.path().join("playlists/roadtrip.m3u")).expect("read");
        assert!(!content.contains("track://qobuz/xyz"));
    }

    #[tokio::test]
    async fn test_stream_details_is_direct_file() {
        let dir = setup_library();
        let provider = provider(&dir);
        let details = provider
            .get_stream_details(
                "The Beatles/Abbey Road (Remastered)/01 - Come Together.mp3",
                MediaType::Track,
            )
            .await
            .unwrap();
        assert_eq!(details.stream_type, StreamType::File);
        assert!(details.direct);
        assert!(details.size.is_some());
    }

    #[test]
    fn test_parse_title_and_version() {
        assert_eq!(
            parse_title_and_version("Abbey Road (Remastered)"),
            ("Abbey Road".to_string(), "Remastered".to_string())
        );
        assert_eq!(
            parse_title_and_version("Abbey Road"),
            ("Abbey Road".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_m3u_skips_comments() {
        let entries = parse_m3u("#EXTM3U\n\na.mp3\n# comment\nb.mp3\n");
        assert_eq!(entries, vec!["a.mp3", "b.mp3"]);
    }
}
