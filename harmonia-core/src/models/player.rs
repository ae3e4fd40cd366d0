//! Player model as reported by player providers and recomputed by the
//! player manager.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
    Off,
}

/// Optional features a player driver can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerFeature {
    Power,
    VolumeSet,
    VolumeMute,
    /// Player can seamlessly continue into a prefetched next item.
    Gapless,
    Crossfade,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub model: String,
    pub manufacturer: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub player_id: String,
    /// Player provider instance this player belongs to.
    pub provider_id: String,
    pub name: String,
    pub state: PlayerState,
    pub powered: bool,
    /// Transport url of the item currently loaded in the player.
    pub current_url: Option<String>,
    /// Seconds into the current item. Frozen while the player is OFF.
    pub elapsed_time: u32,
    /// 0..=100
    pub volume_level: u32,
    pub muted: bool,
    pub available: bool,
    pub is_group: bool,
    pub group_childs: Vec<String>,
    pub features: HashSet<PlayerFeature>,
    pub should_poll: bool,
    pub device_info: DeviceInfo,
}

impl Player {
    pub fn new(player_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            provider_id: provider_id.into(),
            available: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn has_feature(&self, feature: PlayerFeature) -> bool {
        self.features.contains(&feature)
    }
}
