//! Catalog metadata
//!
//! # Files
//!
//! - `<base>/catalog.json` - Catalog (profile order, activation, sources)
//! - `<base>/profiles/<id>.txt` - Per-profile hosts content

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hosts::write_atomic;

const CATALOG_FILE: &str = "catalog.json";

/// Where a profile's content comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProfileSource {
    /// Edited locally only
    #[default]
    Local,

    /// Refreshed from a URL; without `interval` only manual updates apply
    Remote {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<u64>,
    },
}

impl ProfileSource {
    /// Build a source from optional wire fields; no URL means local
    pub fn from_parts(url: Option<String>, interval: Option<u64>) -> Self {
        match url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            Some(url) => Self::Remote {
                url,
                interval: interval.filter(|secs| *secs > 0),
            },
            None => Self::Local,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Remote { url, .. } => Some(url),
            Self::Local => None,
        }
    }

    pub fn interval(&self) -> Option<u64> {
        match self {
            Self::Remote { interval, .. } => *interval,
            Self::Local => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// Catalog entry (everything but the content)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileMetadata {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub source: ProfileSource,

    /// Set only by a successful fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Store-wide counter value stamped when the profile was last activated
    #[serde(default, skip_serializing_if = "is_zero")]
    pub activation_seq: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl ProfileMetadata {
    pub fn new(id: String, name: String, source: ProfileSource) -> Self {
        Self {
            id,
            name,
            active: false,
            source,
            last_update: None,
            activation_seq: 0,
        }
    }
}

/// catalog.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub multi_select: bool,

    /// Catalog order is merge order
    #[serde(default)]
    pub profiles: Vec<ProfileMetadata>,

    /// Derived from `profiles[].active`, rewritten on every save
    #[serde(default)]
    pub active_profile_ids: Vec<String>,
}

impl AppConfig {
    /// Load from file; `None` when the catalog has never been written
    pub fn load(base_dir: &Path) -> Result<Option<Self>> {
        let path = base_dir.join(CATALOG_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.sync_active_ids();
        Ok(Some(config))
    }

    /// Save to file
    pub fn save(&mut self, base_dir: &Path) -> Result<()> {
        fs::create_dir_all(base_dir)?;
        self.sync_active_ids();
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(&base_dir.join(CATALOG_FILE), content.as_bytes())?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ProfileMetadata> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ProfileMetadata> {
        self.profiles.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Active entries in catalog order
    pub fn active(&self) -> impl Iterator<Item = &ProfileMetadata> {
        self.profiles.iter().filter(|p| p.active)
    }

    /// Next activation stamp, strictly above every recorded one
    pub fn next_activation_seq(&self) -> u64 {
        self.profiles
            .iter()
            .map(|p| p.activation_seq)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Rebuild `active_profile_ids` from the per-profile flags
    pub fn sync_active_ids(&mut self) {
        self.active_profile_ids = self
            .profiles
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id.clone())
            .collect();
    }

    /// Keep at most one active profile: highest activation stamp wins,
    /// earliest catalog position breaks ties. Returns true if anything changed.
    pub fn collapse_to_single(&mut self) -> bool {
        let mut keep: Option<(usize, u64)> = None;
        for (idx, profile) in self.profiles.iter().enumerate() {
            if !profile.active {
                continue;
            }
            match keep {
                Some((_, seq)) if profile.activation_seq <= seq => {}
                _ => keep = Some((idx, profile.activation_seq)),
            }
        }

        let mut changed = false;
        for (idx, profile) in self.profiles.iter_mut().enumerate() {
            if profile.active && keep.map(|(k, _)| k) != Some(idx) {
                profile.active = false;
                changed = true;
            }
        }
        self.sync_active_ids();
        changed
    }
}
