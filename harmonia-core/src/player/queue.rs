//! Per-player queue: an ordered item list with shuffle/repeat/crossfade
//! settings and the playback state machine for the attached player.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;

use crate::config::PlayerConfig;
use crate::controllers::ControllerDeps;
use crate::events::EventType;
use crate::models::{PlayerState, QueueItem, QueueSnapshot, RepeatMode};
use crate::provider::PlayerProvider;
use crate::streams::{should_prefetch_next, StreamController};
use crate::{Error, Result};

struct QueueState {
    items: Vec<QueueItem>,
    cur_index: Option<usize>,
    shuffle: bool,
    repeat: RepeatMode,
    crossfade_duration: u32,
    state: PlayerState,
    /// Next-item details already handed to the player for crossfade.
    prefetched_index: Option<usize>,
}

pub struct PlayerQueue {
    player_id: String,
    provider_id: String,
    deps: Arc<ControllerDeps>,
    streams: Arc<StreamController>,
    player_config: PlayerConfig,
    state: RwLock<QueueState>,
}

impl PlayerQueue {
    #[must_use]
    pub fn new(
        player_id: impl Into<String>,
        provider_id: impl Into<String>,
        deps: Arc<ControllerDeps>,
        streams: Arc<StreamController>,
        player_config: PlayerConfig,
    ) -> Arc<Self> {
        let crossfade_duration = player_config.crossfade_duration;
        Arc::new(Self {
            player_id: player_id.into(),
            provider_id: provider_id.into(),
            deps,
            streams,
            player_config,
            state: RwLock::new(QueueState {
                items: Vec::new(),
                cur_index: None,
                shuffle: false,
                repeat: RepeatMode::Off,
                crossfade_duration,
                state: PlayerState::Idle,
                prefetched_index: None,
            }),
        })
    }

    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    fn driver(&self) -> Result<Arc<dyn PlayerProvider>> {
        self.deps
            .registry
            .get_player_provider(&self.provider_id)
            .ok_or_else(|| {
                Error::ProviderUnavailable(format!(
                    "Player provider not available: {}",
                    self.provider_id
                ))
            })
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.read().await;
        QueueSnapshot {
            player_id: self.player_id.clone(),
            items: state.items.clone(),
            cur_index: state.cur_index,
            shuffle: state.shuffle,
            repeat: state.repeat,
            crossfade_duration: state.crossfade_duration,
            state: state.state,
        }
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        self.state.write().await.shuffle = shuffle;
        self.publish_update().await;
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) {
        self.state.write().await.repeat = repeat;
        self.publish_update().await;
    }

    pub async fn set_crossfade(&self, seconds: u32) {
        self.state.write().await.crossfade_duration = seconds;
        self.publish_update().await;
    }

    /// Replace the queue contents and start playing at the first item.
    pub async fn load(&self, items: Vec<QueueItem>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.items = items;
            state.cur_index = None;
            state.prefetched_index = None;
        }
        self.publish_update().await;
        self.play_index(0).await
    }

    /// Insert items relative to the current position; offset 0 starts
    /// playing at the inserted position, 1 queues them up next.
    pub async fn insert(&self, items: Vec<QueueItem>, offset_from_cur: usize) -> Result<()> {
        let insert_index = {
            let mut state = self.state.write().await;
            let insert_index = state
                .cur_index
                .map_or(0, |cur| (cur + offset_from_cur).min(state.items.len()));
            state.items.splice(insert_index..insert_index, items);
            state.prefetched_index = None;
            insert_index
        };
        self.publish_update().await;
        if offset_from_cur == 0 {
            return self.play_index(insert_index).await;
        }
        Ok(())
    }

    /// Append items at the end of the queue.
    pub async fn append(&self, items: Vec<QueueItem>) -> Result<()> {
        self.state.write().await.items.extend(items);
        self.publish_update().await;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.items.clear();
            state.cur_index = None;
            state.prefetched_index = None;
        }
        self.publish_update().await;
        self.stop().await
    }

    /// Start playback of the item at the given index.
    pub async fn play_index(&self, index: usize) -> Result<()> {
        let item = {
            let state = self.state.read().await;
            state.items.get(index).cloned()
        };
        let Some(item) = item else {
            return Err(Error::InvalidInput(format!(
                "No queue item at index {index}"
            )));
        };
        // resolve the stream plan up front so a dead item fails here, not
        // in the player
        self.streams
            .get_stream_details(&item, &self.player_config)
            .await?;
        self.driver()?
            .cmd_play_url(&self.player_id, &item.stream_url)
            .await?;
        {
            let mut state = self.state.write().await;
            state.cur_index = Some(index);
            state.state = PlayerState::Playing;
            state.prefetched_index = None;
            if let Some(queue_item) = state.items.get_mut(index) {
                queue_item.elapsed_time = 0;
            }
        }
        self.publish_update().await;
        Ok(())
    }

    /// Advance to the next item per shuffle/repeat settings. At the end
    /// with repeat off the queue stops and the player returns to idle.
    pub async fn next(&self) -> Result<()> {
        let next_index = {
            let state = self.state.read().await;
            self.next_index_for(&state)
        };
        match next_index {
            Some(index) => self.play_index(index).await,
            None => self.stop().await,
        }
    }

    /// Step back one item (index arithmetic only, no repeat wrap).
    pub async fn previous(&self) -> Result<()> {
        let index = {
            let state = self.state.read().await;
            state.cur_index.unwrap_or(0).saturating_sub(1)
        };
        self.play_index(index).await
    }

    /// Resume playback at the current position.
    pub async fn resume(&self) -> Result<()> {
        let index = self.state.read().await.cur_index.unwrap_or(0);
        self.play_index(index).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.driver()?.cmd_stop(&self.player_id).await?;
        {
            let mut state = self.state.write().await;
            state.state = PlayerState::Idle;
        }
        self.publish_update().await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.driver()?.cmd_pause(&self.player_id).await?;
        self.state.write().await.state = PlayerState::Paused;
        self.publish_update().await;
        Ok(())
    }

    /// Seek within the current item.
    pub async fn seek(&self, position_secs: u32) -> Result<()> {
        self.driver()?.cmd_seek(&self.player_id, position_secs).await?;
        let mut state = self.state.write().await;
        if let Some(index) = state.cur_index {
            if let Some(item) = state.items.get_mut(index) {
                item.elapsed_time = position_secs;
            }
        }
        Ok(())
    }

    /// Feed player-state updates into the queue: track elapsed time,
    /// prefetch the next item's stream for crossfade, auto-advance when a
    /// track ran out.
    pub async fn on_player_update(&self, player_state: PlayerState, elapsed_time: u32) {
        let (finished, prefetch_target) = {
            let mut state = self.state.write().await;
            let previous_state = state.state;
            // a powered-off player freezes elapsed time
            if player_state != PlayerState::Off {
                if let Some(index) = state.cur_index {
                    if player_state == PlayerState::Playing {
                        if let Some(item) = state.items.get_mut(index) {
                            item.elapsed_time = elapsed_time;
                        }
                    }
                }
                state.state = player_state;
            }

            let mut prefetch_target = None;
            if player_state == PlayerState::Playing {
                if let Some(index) = state.cur_index {
                    let duration = state.items.get(index).map_or(0, |item| item.duration);
                    if should_prefetch_next(elapsed_time, duration, state.crossfade_duration)
                        && state.prefetched_index.is_none()
                    {
                        if let Some(next_index) = self.next_index_for(&state) {
                            state.prefetched_index = Some(next_index);
                            prefetch_target = state.items.get(next_index).cloned();
                        }
                    }
                }
            }

            let finished = previous_state == PlayerState::Playing
                && player_state == PlayerState::Idle
                && state.cur_index.is_some_and(|index| {
                    state
                        .items
                        .get(index)
                        .is_some_and(|item| item.duration > 0 && item.elapsed_time + 5 >= item.duration)
                });
            (finished, prefetch_target)
        };

        if let Some(item) = prefetch_target {
            if let Err(err) = self.prefetch(&item).await {
                tracing::debug!(%err, "crossfade prefetch failed");
            }
        }
        if finished {
            if let Err(err) = self.next().await {
                tracing::debug!(%err, "auto-advance failed");
            }
        }
    }

    async fn prefetch(&self, item: &QueueItem) -> Result<()> {
        self.streams
            .get_stream_details(item, &self.player_config)
            .await?;
        // players without gapless support simply ignore this
        self.driver()?
            .cmd_prefetch_next(&self.player_id, &item.stream_url)
            .await
    }

    fn next_index_for(&self, state: &QueueState) -> Option<usize> {
        if state.items.is_empty() {
            return None;
        }
        let cur = state.cur_index?;
        match state.repeat {
            RepeatMode::One => Some(cur),
            _ if state.shuffle && state.items.len() > 1 => {
                let mut rng = rand::thread_rng();
                loop {
                    let candidate = rng.gen_range(0..state.items.len());
                    if candidate != cur {
                        return Some(candidate);
                    }
                }
            }
            RepeatMode::All => Some((cur + 1) % state.items.len()),
            RepeatMode::Off => {
                let next = cur + 1;
                (next < state.items.len()).then_some(next)
            }
        }
    }

    async fn publish_update(&self) {
        let snapshot = self.snapshot().await;
        self.deps.events.publish_obj(
            EventType::QueueUpdated,
            Some(self.player_id.clone()),
            &snapshot,
        );
    }
}

impl std::fmt::Debug for PlayerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerQueue")
            .field("player_id", &self.player_id)
            .finish()
    }
}
