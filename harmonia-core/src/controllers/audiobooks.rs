//! Audiobook controller.
//!
//! Audiobooks carry resume state: the position is reported back by the
//! player pipeline through `mark_played` and forwarded to the owning
//! provider so progress follows the user across clients.

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{ControllerDeps, ItemController, MediaController};
use crate::models::{Audiobook, MediaItem, MediaType};
use crate::provider::with_provider_policy;
use crate::Result;

#[derive(Clone)]
pub struct AudiobookController {
    base: Arc<MediaController<Audiobook>>,
}

impl AudiobookController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
        })
    }

    /// Record playback progress on the canonical row and notify providers.
    pub async fn mark_played(
        &self,
        db_id: i64,
        fully_played: bool,
        position_secs: u32,
    ) -> Result<()> {
        let mut audiobook = self.base.get_db_item(&db_id.to_string()).await?;
        audiobook.resume_position_ms = u64::from(position_secs) * 1000;
        audiobook.fully_played = fully_played;
        let stored = self.base.repo().update(db_id, &audiobook).await?;

        for mapping in stored.provider_mappings() {
            let Some(provider) = self.base.deps().registry.get(&mapping.provider_instance) else {
                continue;
            };
            let result = with_provider_policy("on_played", || {
                provider.on_played(
                    MediaType::Audiobook,
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
impl ItemController for AudiobookController {
    type Item = Audiobook;

    fn base(&self) -> &MediaController<Audiobook> {
        &self.base
    }

    async fn add(&self, item: Audiobook, _suppress_matching: bool) -> Result<Audiobook> {
        let (stored, _created) = self.base.add_or_update(&item).await?;
        Ok(stored)
    }
}
