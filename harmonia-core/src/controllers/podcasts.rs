//! Podcast and episode controller.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::base::{ControllerDeps, ItemController, MediaController};
use crate::models::{Episode, MediaItem, MediaType, Podcast};
use crate::provider::with_provider_policy;
use crate::{Result, DB_PROVIDER};

#[derive(Clone)]
pub struct PodcastController {
    base: Arc<MediaController<Podcast>>,
    episodes: Arc<MediaController<Episode>>,
}

impl PodcastController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps.clone())),
            episodes: Arc::new(MediaController::new(deps)),
        })
    }

    #[must_use]
    pub const fn episodes(&self) -> &Arc<MediaController<Episode>> {
        &self.episodes
    }

    /// Episodes of a podcast, in episode order, canonical rows substituted.
    pub async fn podcast_episodes(
        &self,
        item_id: &str,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<Episode>> {
        let podcast = if provider_instance_or_domain == DB_PROVIDER {
            self.base.get_db_item(item_id).await?
        } else {
            self.base
                .get_provider_item(item_id, provider_instance_or_domain, false)
                .await?
        };
        let Some((prov_instance, prov_item_id)) = self.base.preferred_provider_mapping(&podcast)
        else {
            return Ok(Vec::new());
        };
        let Some(provider) = self.base.deps().registry.get(&prov_instance) else {
            return Ok(Vec::new());
        };
        let mut episodes = Vec::new();
        let mut stream = provider.podcast_episodes(&prov_item_id);
        while let Some(episode) = stream.next().await {
            match episode {
                Ok(mut episode) => {
                    if let Some(db_episode) = self
                        .episodes
                        .get_db_item_by_prov_id(&episode.item_id, &prov_instance)
                        .await?
                    {
                        episode = db_episode;
                    }
                    episodes.push(episode);
                }
                Err(err) => tracing::warn!(%err, "skipping episode from provider listing"),
            }
        }
        episodes.sort_by_key(|episode| episode.episode_number.unwrap_or(u32::MAX));
        Ok(episodes)
    }

    /// Record episode playback progress and notify providers.
    pub async fn mark_episode_played(
        &self,
        db_id: i64,
        fully_played: bool,
        position_secs: u32,
    ) -> Result<()> {
        let mut episode = self.episodes.get_db_item(&db_id.to_string()).await?;
        episode.resume_position_ms = u64::from(position_secs) * 1000;
        episode.fully_played = fully_played;
        let stored = self.episodes.repo().update(db_id, &episode).await?;

        for mapping in stored.provider_mappings() {
            let Some(provider) = self.base.deps().registry.get(&mapping.provider_instance) else {
                continue;
            };
            let result = with_provider_policy("on_played", || {
                provider.on_played(
                    MediaType::Episode,
                    &mapping.item_id,
                    fully_played,
                    position_secs,
                )
            })
            .await;
            if let Err(err) = result {
                tracing::warn!(
                    provider = %mapping.provider_instance,
                    %err,
                    "progress report failed"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ItemController for PodcastController {
    type Item = Podcast;

    fn base(&self) -> &MediaController<Podcast> {
        &self.base
    }

    async fn add(&self, item: Podcast, _suppress_matching: bool) -> Result<Podcast> {
        let (stored, _created) = self.base.add_or_update(&item).await?;
        Ok(stored)
    }
}
