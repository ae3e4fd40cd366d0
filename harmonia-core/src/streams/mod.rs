//! Stream coordinator.
//!
//! Resolves a queue item into [`StreamDetails`]: the best available
//! provider mapping, the audio format and the replay-gain correction. The
//! resolved details are kept in a registry keyed by queue item id; the
//! external stream endpoint looks them up and proxies (or redirects to)
//! the underlying provider audio.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::PlayerConfig;
use crate::controllers::ControllerDeps;
use crate::events::EventType;
use crate::models::{ProviderMapping, QueueItem, StreamDetails};
use crate::provider::with_provider_policy;
use crate::{Error, Result};

/// Fraction of an item's duration after which it counts as fully played.
const FULLY_PLAYED_FRACTION: f64 = 0.9;

pub struct StreamController {
    deps: Arc<ControllerDeps>,
    /// Resolved details per queue item, for the stream endpoint.
    active: DashMap<Uuid, StreamDetails>,
}

impl StreamController {
    #[must_use]
    pub fn new(deps: Arc<ControllerDeps>) -> Arc<Self> {
        Arc::new(Self {
            deps,
            active: DashMap::new(),
        })
    }

    /// Transport url for one queue item, served by the stream endpoint.
    #[must_use]
    pub fn resolve_stream_url(&self, player_id: &str, queue_item_id: Uuid) -> String {
        format!(
            "{}/stream/{player_id}/{queue_item_id}",
            self.deps.stream_base_url
        )
    }

    /// Resolve stream details for a queue item: rank the available
    /// mappings, ask providers in order, first success wins.
    pub async fn get_stream_details(
        &self,
        queue_item: &QueueItem,
        player_config: &PlayerConfig,
    ) -> Result<StreamDetails> {
        let media_type = queue_item.media_item.media_type();
        let ranked = rank_mappings(queue_item.media_item.provider_mappings());
        if ranked.is_empty() {
            return Err(Error::MediaNotFound(format!(
                "No available provider mapping for {}",
                queue_item.media_item.uri()
            )));
        }

        let mut details: Option<StreamDetails> = None;
        for mapping in &ranked {
            let Some(provider) = self.deps.registry.get(&mapping.provider_instance) else {
                continue;
            };
            match with_provider_policy("get_stream_details", || {
                provider.get_stream_details(&mapping.item_id, media_type)
            })
            .await
            {
                Ok(resolved) => {
                    details = Some(resolved);
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %mapping.provider_instance,
                        item = %mapping.item_id,
                        %err,
                        "stream details failed, trying next mapping"
                    );
                }
            }
        }
        let mut details = details.ok_or_else(|| {
            Error::Stream(format!(
                "All providers failed to stream {}",
                queue_item.media_item.uri()
            ))
        })?;

        if details.duration.is_none() {
            details.duration = queue_item.media_item.duration();
        }
        details.queue_id = Some(queue_item.queue_item_id.to_string());
        details.gain_correct = Some(self.calculate_gain_correct(&details, player_config).await);

        self.active
            .insert(queue_item.queue_item_id, details.clone());
        self.deps.events.publish_obj(
            EventType::StreamStarted,
            Some(queue_item.media_item.uri().to_string()),
            &details,
        );
        Ok(details)
    }

    /// Replay-gain correction for the resolved stream.
    async fn calculate_gain_correct(
        &self,
        details: &StreamDetails,
        player_config: &PlayerConfig,
    ) -> f64 {
        if !player_config.volume_normalization {
            return 0.0;
        }
        let loudness = self
            .deps
            .loudness
            .get(&details.provider, &details.item_id)
            .await
            .unwrap_or(None);
        let gain_correct = match loudness {
            Some(loudness) => player_config.target_volume - loudness,
            None => player_config.fallback_gain_correct,
        };
        tracing::debug!(
            provider = %details.provider,
            item = %details.item_id,
            ?loudness,
            gain_correct,
            "calculated replay-gain"
        );
        (gain_correct * 100.0).round() / 100.0
    }

    /// Stored details for a queue item, as used by the stream endpoint.
    /// Expired details are dropped.
    #[must_use]
    pub fn get_active(&self, queue_item_id: Uuid) -> Option<StreamDetails> {
        let details = self.active.get(&queue_item_id)?.clone();
        if details.is_expired() {
            self.active.remove(&queue_item_id);
            return None;
        }
        Some(details)
    }

    /// Loudness observed by the decode pipeline at stream end.
    pub async fn report_loudness(
        &self,
        provider: &str,
        item_id: &str,
        loudness_lufs: f64,
    ) -> Result<()> {
        self.deps.loudness.set(provider, item_id, loudness_lufs).await
    }

    /// A stream finished; record how much was played, notify the provider
    /// and drop the registry entry.
    pub async fn report_stream_ended(&self, queue_item_id: Uuid, seconds_streamed: f64) {
        let Some((_, mut details)) = self.active.remove(&queue_item_id) else {
            return;
        };
        details.seconds_streamed = seconds_streamed;
        let fully_played = details
            .duration
            .is_some_and(|duration| {
                duration > 0 && seconds_streamed >= f64::from(duration) * FULLY_PLAYED_FRACTION
            });

        if let Some(provider) = self.deps.registry.get(&details.provider) {
            let result = provider
                .on_played(
                    details.media_type,
                    &details.item_id,
                    fully_played,
                    seconds_streamed as u32,
                )
                .await;
            if let Err(err) = result {
                tracing::warn!(%err, "on_played callback failed");
            }
        }
        self.deps.events.publish_obj(
            EventType::StreamEnded,
            Some(details.uri()),
            &details,
        );
    }

    /// Url of the internal short-preview endpoint for a track.
    #[must_use]
    pub fn get_preview_url(&self, provider_instance_or_domain: &str, item_id: &str) -> String {
        format!(
            "{}/preview/{provider_instance_or_domain}/{item_id}",
            self.deps.stream_base_url
        )
    }
}

impl std::fmt::Debug for StreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamController")
            .field("active", &self.active.len())
            .finish()
    }
}

/// Rank mappings for stream selection: available only, filesystem tier
/// first, then by quality descending; ties break on instance id for
/// determinism.
#[must_use]
pub fn rank_mappings(
    mappings: &std::collections::HashSet<ProviderMapping>,
) -> Vec<ProviderMapping> {
    let mut ranked: Vec<ProviderMapping> = mappings
        .iter()
        .filter(|mapping| mapping.available)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| {
        let tier_a = !a.provider_domain.starts_with("filesystem");
        let tier_b = !b.provider_domain.starts_with("filesystem");
        tier_a
            .cmp(&tier_b)
            .then(b.quality().cmp(&a.quality()))
            .then(a.provider_instance.cmp(&b.provider_instance))
    });
    ranked
}

/// Whether a playing item is close enough to its end that the next item's
/// stream should be prefetched for crossfade.
#[must_use]
pub fn should_prefetch_next(elapsed: u32, duration: u32, crossfade_duration: u32) -> bool {
    crossfade_duration > 0 && duration > 0 && elapsed + crossfade_duration >= duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use std::collections::HashSet;

    fn mapping(
        instance: &str,
        domain: &str,
        content_type: ContentType,
        sample_rate: u32,
        bit_depth: u32,
        bit_rate: u32,
        available: bool,
    ) -> ProviderMapping {
        let mut m = ProviderMapping::new(instance, domain, "item");
        m.content_type = content_type;
        m.sample_rate = sample_rate;
        m.bit_depth = bit_depth;
        m.bit_rate = bit_rate;
        m.available = available;
        m
    }

    #[test]
    fn test_rank_prefers_filesystem_then_quality() {
        let mappings: HashSet<ProviderMapping> = HashSet::from([
            mapping("filesystem--local", "filesystem", ContentType::Flac, 96_000, 24, 0, true),
            mapping("spotify--1", "spotify", ContentType::Ogg, 44_100, 16, 320, true),
            mapping("qobuz--1", "qobuz", ContentType::Flac, 44_100, 16, 0, true),
        ]);
        let ranked = rank_mappings(&mappings);
        assert_eq!(ranked[0].provider_domain, "filesystem");
        // lossless 44.1/16 (score 60) beats ogg 320 (score 4)
        assert_eq!(ranked[1].provider_domain, "qobuz");
        assert_eq!(ranked[2].provider_domain, "spotify");
    }

    #[test]
    fn test_rank_skips_unavailable() {
        let mappings: HashSet<ProviderMapping> = HashSet::from([
            mapping("filesystem--local", "filesystem", ContentType::Flac, 96_000, 24, 0, false),
            mapping("qobuz--1", "qobuz", ContentType::Flac, 44_100, 16, 0, true),
            mapping("spotify--1", "spotify", ContentType::Ogg, 44_100, 16, 320, true),
        ]);
        let ranked = rank_mappings(&mappings);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].provider_domain, "qobuz");
    }

    #[test]
    fn test_rank_tie_breaks_on_instance_id() {
        let a = mapping("spotify--a", "spotify", ContentType::Ogg, 44_100, 16, 320, true);
        let b = mapping("spotify--b", "spotify", ContentType::Ogg, 44_100, 16, 320, true);
        // different item ids so the set keeps both
        let mut b = b;
        b.item_id = "item2".to_string();
        let ranked = rank_mappings(&HashSet::from([a, b]));
        assert_eq!(ranked[0].provider_instance, "spotify--a");
    }

    #[test]
    fn test_should_prefetch_next() {
        assert!(should_prefetch_next(55, 60, 5));
        assert!(should_prefetch_next(58, 60, 5));
        assert!(!should_prefetch_next(50, 60, 5));
        // crossfade disabled
        assert!(!should_prefetch_next(59, 60, 0));
    }
}
