//! Periodic provider synchronisation.
//!
//! For each registered provider instance, one sync job per entity type it
//! supports reconciles the remote library state with the local canonical
//! copy, including deletions. At most one job runs per
//! `(provider_instance, entity)` tag; a duplicate launch is logged and
//! dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;

use crate::controllers::{GetOptions, ItemController, LibraryEntity, Music};
use crate::events::EventType;
use crate::models::{MediaItem, MediaType};
use crate::provider::{MusicProvider, ProviderCapability};
use crate::Result;

/// Entity types the engine reconciles, in sync order.
const SYNC_MEDIA_TYPES: &[MediaType] = &[
    MediaType::Artist,
    MediaType::Album,
    MediaType::Track,
    MediaType::Playlist,
    MediaType::Radio,
    MediaType::Audiobook,
    MediaType::Podcast,
];

/// Tag identifying one running sync job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SyncJob {
    pub provider_instance: String,
    pub entity: &'static str,
}

pub struct SyncEngine {
    music: Arc<Music>,
    running_jobs: Mutex<HashSet<SyncJob>>,
    interval: Duration,
}

impl SyncEngine {
    #[must_use]
    pub fn new(music: Arc<Music>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            music,
            running_jobs: Mutex::new(HashSet::new()),
            interval,
        })
    }

    /// Run the periodic sync loop until the task is aborted. The first
    /// pass starts immediately.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.interval);
            loop {
                ticker.tick().await;
                engine.sync_all().await;
            }
        })
    }

    /// Kick off sync jobs for every registered provider. Jobs of different
    /// providers run in parallel.
    pub async fn sync_all(&self) {
        let providers = self.music.deps.registry.providers();
        tracing::info!(providers = providers.len(), "starting provider sync");
        let jobs = providers.into_iter().map(|provider| {
            let handle = SyncHandle {
                music: self.music.clone(),
                running_jobs: &self.running_jobs,
            };
            async move { handle.sync_provider(provider).await }
        });
        futures::future::join_all(jobs).await;
    }

    /// Sync one provider instance across all entity types it supports.
    pub async fn sync_provider(&self, instance_id: &str) -> Result<()> {
        let provider = self.music.deps.registry.get(instance_id).ok_or_else(|| {
            crate::Error::ProviderUnavailable(format!("Provider not found: {instance_id}"))
        })?;
        SyncHandle {
            music: self.music.clone(),
            running_jobs: &self.running_jobs,
        }
        .sync_provider(provider)
        .await;
        Ok(())
    }

    /// Run a single sync job; the at-most-one rule applies.
    pub async fn sync_library(
        &self,
        instance_id: &str,
        media_type: MediaType,
    ) -> Result<()> {
        let provider = self.music.deps.registry.get(instance_id).ok_or_else(|| {
            crate::Error::ProviderUnavailable(format!("Provider not found: {instance_id}"))
        })?;
        SyncHandle {
            music: self.music.clone(),
            running_jobs: &self.running_jobs,
        }
        .sync_entity_job(&provider, media_type)
        .await;
        Ok(())
    }

    /// Snapshot of the currently running jobs.
    #[must_use]
    pub fn running_jobs(&self) -> Vec<SyncJob> {
        self.running_jobs
            .lock()
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("running_jobs", &self.running_jobs())
            .finish()
    }
}

/// Borrowed view used by the per-job workers.
struct SyncHandle<'a> {
    music: Arc<Music>,
    running_jobs: &'a Mutex<HashSet<SyncJob>>,
}

impl SyncHandle<'_> {
    async fn sync_provider(&self, provider: Arc<dyn MusicProvider>) {
        for media_type in SYNC_MEDIA_TYPES {
            self.sync_entity_job(&provider, *media_type).await;
        }
    }

    async fn sync_entity_job(&self, provider: &Arc<dyn MusicProvider>, media_type: MediaType) {
        let Some(capability) = ProviderCapability::library_for(media_type) else {
            return;
        };
        if !provider.supports(capability) {
            return;
        }
        let job = SyncJob {
            provider_instance: provider.instance_id().to_string(),
            entity: media_type.as_str(),
        };
        if !self.begin_job(job.clone()) {
            tracing::warn!(
                provider = %job.provider_instance,
                entity = job.entity,
                "sync job is already running"
            );
            return;
        }
        self.publish_status();

        let result = match media_type {
            MediaType::Artist => self.sync_entity(self.music.artists.as_ref(), provider).await,
            MediaType::Album => self.sync_entity(self.music.albums.as_ref(), provider).await,
            MediaType::Track => self.sync_entity(self.music.tracks.as_ref(), provider).await,
            MediaType::Playlist => {
                self.sync_entity(self.music.playlists.as_ref(), provider).await
            }
            MediaType::Radio => self.sync_entity(self.music.radios.as_ref(), provider).await,
            MediaType::Audiobook => {
                self.sync_entity(self.music.audiobooks.as_ref(), provider).await
            }
            MediaType::Podcast => {
                self.sync_entity(self.music.podcasts.as_ref(), provider).await
            }
            _ => Ok(()),
        };
        match result {
            Ok(()) => tracing::info!(
                provider = %job.provider_instance,
                entity = job.entity,
                "finished sync"
            ),
            Err(err) => tracing::error!(
                provider = %job.provider_instance,
                entity = job.entity,
                %err,
                "sync failed"
            ),
        }

        self.finish_job(&job);
        self.publish_status();
    }

    /// Reconcile one provider's library of one entity type.
    ///
    /// The remote listing is authoritative: every listed item is written
    /// through the controller (forcing a canonical row), everything that
    /// was in-library for this provider but is no longer listed gets its
    /// library flag cleared. The provider's remote state is never touched.
    async fn sync_entity<C: ItemController>(
        &self,
        controller: &C,
        provider: &Arc<dyn MusicProvider>,
    ) -> Result<()> {
        let prev: HashSet<i64> = controller
            .base()
            .repo()
            .library_ids_for_provider(provider.instance_id())
            .await?
            .into_iter()
            .collect();
        let mut cur: HashSet<i64> = HashSet::new();

        let mut stream = C::Item::library_stream(provider.as_ref());
        while let Some(item) = stream.next().await {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    // one bad item must not abort the whole sync
                    tracing::warn!(%err, "skipping item from library listing");
                    continue;
                }
            };
            let prov_item_id = item.item_id().to_string();
            let db_item = match controller
                .get(
                    &prov_item_id,
                    provider.instance_id(),
                    GetOptions {
                        lazy: false,
                        details: Some(item),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(db_item) => db_item,
                Err(err) => {
                    tracing::warn!(item = %prov_item_id, %err, "failed to sync library item");
                    continue;
                }
            };
            let Ok(db_id) = db_item.item_id().parse::<i64>() else {
                continue;
            };
            cur.insert(db_id);
            if !prev.contains(&db_id) {
                controller.base().set_in_library(db_id, true).await?;
            }
        }

        for db_id in prev.difference(&cur) {
            controller.base().set_in_library(*db_id, false).await?;
        }
        Ok(())
    }

    fn begin_job(&self, job: SyncJob) -> bool {
        match self.running_jobs.lock() {
            Ok(mut jobs) => jobs.insert(job),
            Err(_) => false,
        }
    }

    fn finish_job(&self, job: &SyncJob) {
        if let Ok(mut jobs) = self.running_jobs.lock() {
            jobs.remove(job);
        }
    }

    fn publish_status(&self) {
        let snapshot: Vec<SyncJob> = self
            .running_jobs
            .lock()
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default();
        self.music
            .deps
            .events
            .publish_obj(EventType::MusicSyncStatus, None, &snapshot);
    }
}
