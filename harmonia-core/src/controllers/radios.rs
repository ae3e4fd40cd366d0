//! Radio station controller.

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{ControllerDeps, ItemController, MediaController};
use crate::models::Radio;
use crate::Result;

#[derive(Clone)]
pub struct RadioController {
    base: Arc<MediaController<Radio>>,
}

impl RadioController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        Arc::new(Self {
            base: Arc::new(MediaController::new(deps)),
        })
    }
}

#[async_trait]
impl ItemController for RadioController {
    type Item = Radio;

    fn base(&self) -> &MediaController<Radio> {
        &self.base
    }

    async fn add(&self, item: Radio, _suppress_matching: bool) -> Result<Radio> {
        // radio stations are never cross-provider matched
        let (stored, _created) = self.base.add_or_update(&item).await?;
        Ok(stored)
    }
}
