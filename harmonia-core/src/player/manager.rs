//! Player manager: the player roster, command dispatch, external player
//! controls, group-player aggregation and the poll loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigEntry, ConfigEntryType, ConfigValueOption};
use crate::controllers::{ControllerDeps, Music};
use crate::events::EventType;
use crate::models::{MediaItemType, Player, PlayerState, QueueItem, QueueOption};
use crate::player::queue::PlayerQueue;
use crate::streams::StreamController;
use crate::{Error, Result};

/// Players not in the playing state are refreshed every this many poll
/// ticks (one tick per second).
pub const POLL_INTERVAL: u32 = 10;

/// Queue expansions larger than this degrade PLAY/NEXT to REPLACE.
const QUEUE_INSERT_LIMIT: usize = 10;

pub const CONF_POWER_CONTROL: &str = "power_control";
pub const CONF_VOLUME_CONTROL: &str = "volume_control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerControlType {
    Power,
    Volume,
}

/// An external on/off or volume control attached to a player by id.
/// A registered power control overrides `powered`, a volume control
/// overrides `volume_level`.
#[async_trait]
pub trait PlayerControl: Send + Sync {
    fn control_id(&self) -> &str;
    fn control_type(&self) -> PlayerControlType;
    fn name(&self) -> &str;
    /// Current state: 0/1 for power controls, 0..=100 for volume controls.
    fn current_state(&self) -> f64;
    async fn set_state(&self, value: f64) -> Result<()>;
}

pub struct PlayerManager {
    deps: Arc<ControllerDeps>,
    music: Arc<Music>,
    streams: Arc<StreamController>,
    config: Config,
    /// Derived player state, recomputed on every update.
    players: DashMap<String, Player>,
    /// Raw state as last reported by the drivers.
    org_players: DashMap<String, Player>,
    queues: DashMap<String, Arc<PlayerQueue>>,
    controls: DashMap<String, Arc<dyn PlayerControl>>,
    poll_ticks: AtomicU32,
}

impl PlayerManager {
    #[must_use]
    pub fn new(
        deps: Arc<ControllerDeps>,
        music: Arc<Music>,
        streams: Arc<StreamController>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            deps,
            music,
            streams,
            config,
            players: DashMap::new(),
            org_players: DashMap::new(),
            queues: DashMap::new(),
            controls: DashMap::new(),
            poll_ticks: AtomicU32::new(0),
        })
    }

    /// Run the poll loop: every second, players marked `should_poll` are
    /// refreshed; playing players every tick, others every
    /// [`POLL_INTERVAL`] ticks.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                ticker.tick().await;
                manager.poll_players().await;
            }
        })
    }

    async fn poll_players(&self) {
        let ticks = self.poll_ticks.load(Ordering::Relaxed);
        let due: Vec<Player> = self
            .org_players
            .iter()
            .filter(|entry| {
                entry.should_poll
                    && (ticks >= POLL_INTERVAL || entry.state == PlayerState::Playing)
            })
            .map(|entry| entry.clone())
            .collect();
        for player in due {
            let Some(provider) = self.deps.registry.get_player_provider(&player.provider_id)
            else {
                continue;
            };
            match provider.poll_player(&player.player_id).await {
                Ok(update) => self.update_player(update).await,
                Err(err) => {
                    tracing::debug!(player = %player.player_id, %err, "player poll failed");
                }
            }
        }
        if ticks >= POLL_INTERVAL {
            self.poll_ticks.store(0, Ordering::Relaxed);
        } else {
            self.poll_ticks.store(ticks + 1, Ordering::Relaxed);
        }
    }

    // roster

    /// Register a new player (or update an existing one). First sight
    /// creates the attached queue.
    pub async fn add_player(&self, player: Player) {
        let player_id = player.player_id.clone();
        let is_new = !self.players.contains_key(&player_id);
        self.create_player_state(player);
        if is_new {
            let derived = self
                .players
                .get(&player_id)
                .map(|entry| entry.clone())
                .unwrap_or_default();
            self.queues.entry(player_id.clone()).or_insert_with(|| {
                PlayerQueue::new(
                    player_id.clone(),
                    derived.provider_id.clone(),
                    self.deps.clone(),
                    self.streams.clone(),
                    self.config.player_config(&player_id),
                )
            });
            tracing::info!(player = %player_id, name = %derived.name, "new player added");
            self.deps
                .events
                .publish_obj(EventType::PlayerAdded, Some(player_id), &derived);
        }
    }

    /// Update an existing player (registers it when unknown) and forward
    /// the new state to the attached queue.
    pub async fn update_player(&self, player: Player) {
        let player_id = player.player_id.clone();
        if !self.players.contains_key(&player_id) {
            return self.add_player(player).await;
        }
        self.create_player_state(player);
        let derived = self
            .players
            .get(&player_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        self.deps.events.publish_obj(
            EventType::PlayerChanged,
            Some(player_id.clone()),
            &derived,
        );
        if let Some(queue) = self.get_queue(&player_id) {
            queue
                .on_player_update(derived.state, derived.elapsed_time)
                .await;
        }
    }

    pub fn remove_player(&self, player_id: &str) {
        self.players.remove(player_id);
        self.org_players.remove(player_id);
        self.queues.remove(player_id);
        tracing::info!(player = player_id, "player removed");
        self.deps.events.publish(
            EventType::PlayerRemoved,
            Some(player_id.to_string()),
            serde_json::json!({ "player_id": player_id }),
        );
    }

    #[must_use]
    pub fn get_player(&self, player_id: &str) -> Option<Player> {
        self.players.get(player_id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn players(&self) -> Vec<Player> {
        self.players.iter().map(|entry| entry.clone()).collect()
    }

    #[must_use]
    pub fn get_queue(&self, player_id: &str) -> Option<Arc<PlayerQueue>> {
        self.queues.get(player_id).map(|entry| entry.clone())
    }

    // player controls

    pub fn register_player_control(&self, control: Arc<dyn PlayerControl>) {
        let control_id = control.control_id().to_string();
        tracing::info!(
            control = %control_id,
            kind = ?control.control_type(),
            "player control registered"
        );
        self.controls.insert(control_id.clone(), control);
        self.deps.events.publish(
            EventType::PlayerControlRegistered,
            Some(control_id.clone()),
            serde_json::json!({ "control_id": control_id }),
        );
        self.refresh_players_using_control(&control_id);
    }

    /// Called by control owners when an external control changed state.
    pub fn player_control_updated(&self, control_id: &str) {
        self.deps.events.publish(
            EventType::PlayerControlUpdated,
            Some(control_id.to_string()),
            serde_json::json!({ "control_id": control_id }),
        );
        self.refresh_players_using_control(control_id);
    }

    fn refresh_players_using_control(&self, control_id: &str) {
        let affected: Vec<Player> = self
            .org_players
            .iter()
            .filter(|entry| {
                let conf = self.config.player_config(&entry.player_id);
                conf.power_control.as_deref() == Some(control_id)
                    || conf.volume_control.as_deref() == Some(control_id)
            })
            .map(|entry| entry.clone())
            .collect();
        for player in affected {
            self.create_player_state(player);
        }
    }

    /// Config entries the player settings gain when controls are
    /// registered.
    #[must_use]
    pub fn player_control_config_entries(&self) -> Vec<ConfigEntry> {
        let mut entries = Vec::new();
        for (key, control_type) in [
            (CONF_POWER_CONTROL, PlayerControlType::Power),
            (CONF_VOLUME_CONTROL, PlayerControlType::Volume),
        ] {
            let options: Vec<ConfigValueOption> = self
                .controls
                .iter()
                .filter(|entry| entry.control_type() == control_type)
                .map(|entry| ConfigValueOption {
                    text: entry.name().to_string(),
                    value: serde_json::Value::String(entry.control_id().to_string()),
                })
                .collect();
            if !options.is_empty() {
                entries.push(ConfigEntry::new(key, ConfigEntryType::String).with_options(options));
            }
        }
        entries
    }

    // commands

    pub async fn cmd_stop(&self, player_id: &str) -> Result<()> {
        let queue = self.require_queue(player_id)?;
        queue.stop().await
    }

    pub async fn cmd_play(&self, player_id: &str) -> Result<()> {
        self.cmd_power_on(player_id).await?;
        let player = self.require_player(player_id)?;
        if player.state == PlayerState::Paused {
            return self.driver_for(&player)?.cmd_play(player_id).await;
        }
        self.require_queue(player_id)?.resume().await
    }

    pub async fn cmd_pause(&self, player_id: &str) -> Result<()> {
        self.require_queue(player_id)?.pause().await
    }

    pub async fn cmd_play_pause(&self, player_id: &str) -> Result<()> {
        let player = self.require_player(player_id)?;
        if player.state == PlayerState::Playing {
            self.cmd_pause(player_id).await
        } else {
            self.cmd_play(player_id).await
        }
    }

    pub async fn cmd_next(&self, player_id: &str) -> Result<()> {
        self.require_queue(player_id)?.next().await
    }

    pub async fn cmd_previous(&self, player_id: &str) -> Result<()> {
        self.require_queue(player_id)?.previous().await
    }

    pub async fn cmd_seek(&self, player_id: &str, position_secs: u32) -> Result<()> {
        self.require_queue(player_id)?.seek(position_secs).await
    }

    pub async fn cmd_power_on(&self, player_id: &str) -> Result<()> {
        let player = self.require_player(player_id)?;
        self.driver_for(&player)?.cmd_power(player_id, true).await?;
        if let Some(control) = self.power_control_for(player_id) {
            if let Err(err) = control.set_state(1.0).await {
                tracing::warn!(%err, "power control set failed");
            }
        }
        self.apply_power_state(player_id, true);
        Ok(())
    }

    /// Power off; a group player powers off all of its children too.
    pub fn cmd_power_off<'a>(&'a self, player_id: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let player = self.require_player(player_id)?;
            self.driver_for(&player)?.cmd_power(player_id, false).await?;
            if let Some(control) = self.power_control_for(player_id) {
                if let Err(err) = control.set_state(0.0).await {
                    tracing::warn!(%err, "power control set failed");
                }
            }
            self.apply_power_state(player_id, false);
            if let Some(queue) = self.get_queue(player_id) {
                queue.on_player_update(PlayerState::Off, 0).await;
            }
            if player.is_group {
                for child_id in &player.group_childs {
                    if let Err(err) = self.cmd_power_off(child_id).await {
                        tracing::warn!(child = %child_id, %err, "group child power off failed");
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub async fn cmd_power_toggle(&self, player_id: &str) -> Result<()> {
        let player = self.require_player(player_id)?;
        if player.powered {
            self.cmd_power_off(player_id).await
        } else {
            self.cmd_power_on(player_id).await
        }
    }

    /// Set the volume. A bound volume control takes the value (the real
    /// player is pinned to full volume); a group player rescales its
    /// children proportionally.
    pub fn cmd_volume_set<'a>(
        &'a self,
        player_id: &'a str,
        volume_level: u32,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let player = self.require_player(player_id)?;
            if !player.powered {
                return Ok(());
            }
            let volume_level = volume_level.min(100);
            let player_config = self.config.player_config(player_id);

            if let Some(control_id) = &player_config.volume_control {
                if let Some(control) = self.controls.get(control_id) {
                    control.set_state(f64::from(volume_level)).await?;
                    return self
                        .driver_for(&player)?
                        .cmd_volume_set(player_id, 100)
                        .await;
                }
            }

            if player.is_group {
                let cur_volume = player.volume_level;
                if cur_volume == volume_level {
                    // nothing to do; no child receives a command
                    return Ok(());
                }
                for child_id in &player.group_childs {
                    let Some(child) = self.get_player(child_id) else {
                        continue;
                    };
                    if !child.available || !child.powered {
                        continue;
                    }
                    let new_child_volume = if cur_volume == 0 {
                        // all children silent: restart them at the group target
                        volume_level
                    } else {
                        (child.volume_level * volume_level).div_ceil(cur_volume).min(100)
                    };
                    self.cmd_volume_set(child_id, new_child_volume).await?;
                }
                self.apply_volume_state(player_id, volume_level);
                return Ok(());
            }

            self.driver_for(&player)?
                .cmd_volume_set(player_id, volume_level)
                .await?;
            self.apply_volume_state(player_id, volume_level);
            Ok(())
        }
        .boxed()
    }

    pub async fn cmd_volume_up(&self, player_id: &str) -> Result<()> {
        let player = self.require_player(player_id)?;
        self.cmd_volume_set(player_id, (player.volume_level + 1).min(100))
            .await
    }

    pub async fn cmd_volume_down(&self, player_id: &str) -> Result<()> {
        let player = self.require_player(player_id)?;
        self.cmd_volume_set(player_id, player.volume_level.saturating_sub(1))
            .await
    }

    pub async fn cmd_volume_mute(&self, player_id: &str, muted: bool) -> Result<()> {
        let player = self.require_player(player_id)?;
        self.driver_for(&player)?
            .cmd_volume_mute(player_id, muted)
            .await?;
        if let Some(mut entry) = self.org_players.get_mut(player_id) {
            entry.muted = muted;
        }
        if let Some(player) = self.org_players.get(player_id).map(|entry| entry.clone()) {
            self.create_player_state(player);
        }
        Ok(())
    }

    /// Resolve media uris into queue items (expanding artists, albums and
    /// playlists into tracks) and merge them into the player's queue per
    /// the queue option.
    pub async fn play_media(
        &self,
        player_id: &str,
        uris: &[String],
        queue_option: QueueOption,
    ) -> Result<()> {
        let queue = self.require_queue(player_id)?;
        let mut queue_items = Vec::new();
        for uri in uris {
            let media_item = self.music.get_item_by_uri(uri).await?;
            for playable in self.expand_media_item(media_item).await? {
                let duration = playable.duration().unwrap_or_default();
                let mut queue_item = QueueItem::new(playable, duration);
                queue_item.stream_url = self
                    .streams
                    .resolve_stream_url(player_id, queue_item.queue_item_id);
                queue_items.push(queue_item);
            }
        }
        if queue_items.is_empty() {
            return Err(Error::MediaNotFound(
                "Nothing playable found for the given uris".to_string(),
            ));
        }

        // large insertions degrade to a queue replace
        let queue_option = if queue_items.len() > QUEUE_INSERT_LIMIT
            && matches!(queue_option, QueueOption::Play | QueueOption::Next)
        {
            QueueOption::Replace
        } else {
            queue_option
        };

        match queue_option {
            QueueOption::Replace => queue.load(queue_items).await,
            QueueOption::Play => queue.insert(queue_items, 0).await,
            QueueOption::Next => queue.insert(queue_items, 1).await,
            QueueOption::Add => queue.append(queue_items).await,
        }
    }

    /// Expand a media item into its playable units.
    async fn expand_media_item(&self, media_item: MediaItemType) -> Result<Vec<MediaItemType>> {
        match media_item {
            MediaItemType::Artist(artist) => Ok(self
                .music
                .artists
                .artist_toptracks(&artist.item_id, &artist.provider)
                .await?
                .into_iter()
                .map(MediaItemType::Track)
                .collect()),
            MediaItemType::Album(album) => Ok(self
                .music
                .albums
                .album_tracks(&album.item_id, &album.provider)
                .await?
                .into_iter()
                .map(MediaItemType::Track)
                .collect()),
            MediaItemType::Playlist(playlist) => Ok(self
                .music
                .playlists
                .playlist_tracks(&playlist.item_id, &playlist.provider)
                .await?
                .into_iter()
                .map(MediaItemType::Track)
                .collect()),
            MediaItemType::Podcast(podcast) => Ok(self
                .music
                .podcasts
                .podcast_episodes(&podcast.item_id, &podcast.provider)
                .await?
                .into_iter()
                .map(MediaItemType::Episode)
                .collect()),
            playable @ (MediaItemType::Track(_)
            | MediaItemType::Radio(_)
            | MediaItemType::Audiobook(_)
            | MediaItemType::Episode(_)) => Ok(vec![playable]),
            other => Err(Error::InvalidInput(format!(
                "Cannot play media type {}",
                other.media_type()
            ))),
        }
    }

    // derived state

    /// Recompute the derived player state from the raw driver state plus
    /// configuration and registered controls.
    fn create_player_state(&self, player: Player) {
        let player_id = player.player_id.clone();
        let player_config = self.config.player_config(&player_id);
        let previous = self.players.get(&player_id).map(|entry| entry.clone());
        self.org_players.insert(player_id.clone(), player.clone());

        let available = player_config.enabled && player.available;
        let name = player_config
            .name
            .clone()
            .unwrap_or_else(|| player.name.clone());
        let powered = if !available {
            false
        } else if let Some(control) = player_config
            .power_control
            .as_deref()
            .and_then(|id| self.controls.get(id).map(|entry| entry.clone()))
        {
            control.current_state() != 0.0
        } else {
            player.powered
        };
        let state = if !available || !powered {
            PlayerState::Off
        } else {
            player.state
        };
        // a player in OFF never advances elapsed time
        let elapsed_time = if state == PlayerState::Off {
            previous.as_ref().map_or(0, |prev| prev.elapsed_time)
        } else {
            player.elapsed_time
        };
        let volume_level = if !available {
            0
        } else if let Some(control) = player_config
            .volume_control
            .as_deref()
            .and_then(|id| self.controls.get(id).map(|entry| entry.clone()))
        {
            control.current_state() as u32
        } else if player.is_group {
            self.group_volume(&player)
        } else {
            player.volume_level
        };

        let derived = Player {
            player_id: player_id.clone(),
            provider_id: player.provider_id,
            name,
            state,
            powered,
            current_url: player.current_url,
            elapsed_time,
            volume_level,
            muted: player.muted,
            available,
            is_group: player.is_group,
            group_childs: player.group_childs,
            features: player.features,
            should_poll: player.should_poll,
            device_info: player.device_info,
        };
        self.players.insert(player_id, derived);
    }

    /// Group volume: average over powered, available children.
    fn group_volume(&self, group: &Player) -> u32 {
        let mut total = 0;
        let mut active = 0;
        for child_id in &group.group_childs {
            if let Some(child) = self.get_player(child_id) {
                if child.available && child.powered {
                    total += child.volume_level;
                    active += 1;
                }
            }
        }
        if active == 0 {
            0
        } else {
            total / active
        }
    }

    fn apply_power_state(&self, player_id: &str, powered: bool) {
        if let Some(mut entry) = self.org_players.get_mut(player_id) {
            entry.powered = powered;
            if !powered {
                entry.state = PlayerState::Off;
            }
        }
        if let Some(player) = self.org_players.get(player_id).map(|entry| entry.clone()) {
            self.create_player_state(player.clone());
            self.deps.events.publish_obj(
                EventType::PlayerChanged,
                Some(player_id.to_string()),
                &self.get_player(player_id),
            );
        }
    }

    fn apply_volume_state(&self, player_id: &str, volume_level: u32) {
        if let Some(mut entry) = self.org_players.get_mut(player_id) {
            entry.volume_level = volume_level;
        }
        if let Some(player) = self.org_players.get(player_id).map(|entry| entry.clone()) {
            self.create_player_state(player);
        }
    }

    fn require_player(&self, player_id: &str) -> Result<Player> {
        self.get_player(player_id)
            .ok_or_else(|| Error::MediaNotFound(format!("Unknown player: {player_id}")))
    }

    fn require_queue(&self, player_id: &str) -> Result<Arc<PlayerQueue>> {
        self.get_queue(player_id)
            .ok_or_else(|| Error::MediaNotFound(format!("No queue for player: {player_id}")))
    }

    fn driver_for(&self, player: &Player) -> Result<Arc<dyn crate::provider::PlayerProvider>> {
        self.deps
            .registry
            .get_player_provider(&player.provider_id)
            .ok_or_else(|| {
                Error::ProviderUnavailable(format!(
                    "Player provider not available: {}",
                    player.provider_id
                ))
            })
    }

    fn power_control_for(&self, player_id: &str) -> Option<Arc<dyn PlayerControl>> {
        let control_id = self.config.player_config(player_id).power_control?;
        self.controls.get(&control_id).map(|entry| entry.clone())
    }
}

impl std::fmt::Debug for PlayerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerManager")
            .field("players", &self.players.len())
            .field("queues", &self.queues.len())
            .finish()
    }
}
