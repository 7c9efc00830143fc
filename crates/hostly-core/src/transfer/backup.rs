//! Portable backups
//!
//! ```json
//! {
//!   "version": 3,
//!   "exportedAt": "2026-01-01T00:00:00Z",
//!   "commonConfig": "127.0.0.1 localhost",
//!   "multiSelect": false,
//!   "profiles": [
//!     { "id": "...", "name": "Dev", "content": "...", "active": true },
//!     { "id": "...", "name": "Ads", "content": "...", "active": false,
//!       "url": "https://...", "updateInterval": 3600, "lastUpdate": "..." }
//!   ]
//! }
//! ```
//!
//! Older backups (`config` + `common_content` + `profiles_content`) are
//! still accepted on import.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HostlyError, Result};
use crate::profile::{NewProfile, ProfileStore};
use crate::profile_metadata::{AppConfig, ProfileSource};
use crate::remote::validate_source_url;

pub const BACKUP_VERSION: u32 = 3;

/// Current backup document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Backup {
    #[serde(default)]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,

    pub common_config: String,

    pub multi_select: bool,

    pub profiles: Vec<BackupProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackupProfile {
    pub id: String,
    pub name: String,
    pub content: String,
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Backup layout written by earlier releases
#[derive(Debug, Deserialize)]
struct LegacyBackup {
    #[serde(rename = "version")]
    _version: i64,
    #[serde(rename = "timestamp", default)]
    _timestamp: Option<String>,
    config: AppConfig,
    common_content: String,
    profiles_content: HashMap<String, String>,
}

/// Catalog state carried by a backup, ready for `ProfileStore::replace_all`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupContents {
    pub multi_select: bool,
    pub common: String,
    pub profiles: Vec<NewProfile>,
}

impl Backup {
    /// Snapshot the store
    pub fn capture(store: &ProfileStore, exported_at: DateTime<Utc>) -> Self {
        let profiles = store
            .list()
            .into_iter()
            .map(|p| BackupProfile {
                url: p.source.url().map(str::to_string),
                update_interval: p.source.interval(),
                id: p.id,
                name: p.name,
                content: p.content,
                active: p.active,
                last_update: p.last_update,
            })
            .collect();

        Self {
            version: BACKUP_VERSION,
            exported_at: Some(exported_at),
            common_config: store.common().to_string(),
            multi_select: store.multi_select(),
            profiles,
        }
    }

    fn into_contents(self) -> Result<BackupContents> {
        if self.version > BACKUP_VERSION {
            return Err(HostlyError::invalid_format(format!(
                "Backup version {} is newer than supported version {}",
                self.version, BACKUP_VERSION
            )));
        }

        let profiles = self
            .profiles
            .into_iter()
            .map(|p| NewProfile {
                name: p.name,
                content: p.content,
                active: p.active,
                source: ProfileSource::from_parts(p.url, p.update_interval),
                last_update: p.last_update,
            })
            .collect();

        checked(BackupContents {
            multi_select: self.multi_select,
            common: self.common_config,
            profiles,
        })
    }
}

impl LegacyBackup {
    fn into_contents(mut self) -> Result<BackupContents> {
        let profiles = self
            .config
            .profiles
            .into_iter()
            .map(|meta| NewProfile {
                content: self.profiles_content.remove(&meta.id).unwrap_or_default(),
                name: meta.name,
                active: meta.active,
                source: meta.source,
                last_update: meta.last_update,
            })
            .collect();

        checked(BackupContents {
            multi_select: self.config.multi_select,
            common: self.common_content,
            profiles,
        })
    }
}

/// Reject remote sources the fetcher would refuse
fn checked(contents: BackupContents) -> Result<BackupContents> {
    for profile in &contents.profiles {
        if let Some(url) = profile.source.url() {
            validate_source_url(url).map_err(|e| {
                HostlyError::invalid_format(format!("Profile '{}': {}", profile.name, e))
            })?;
        }
    }
    Ok(contents)
}

/// Parse either backup layout without touching any store
pub fn parse_backup(json: &str) -> Result<BackupContents> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| HostlyError::invalid_format(format!("Invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(HostlyError::invalid_format("Backup must be a JSON object"));
    }

    if value.get("profiles_content").is_some() {
        let legacy: LegacyBackup = serde_json::from_value(value)
            .map_err(|e| HostlyError::invalid_format(format!("Invalid legacy backup: {}", e)))?;
        return legacy.into_contents();
    }

    let backup: Backup = serde_json::from_value(value)
        .map_err(|e| HostlyError::invalid_format(format!("Invalid backup: {}", e)))?;
    backup.into_contents()
}

/// Serialize the whole catalog
pub fn export_all(store: &ProfileStore) -> Result<String> {
    let backup = Backup::capture(store, Utc::now());
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// Replace the catalog with a backup. The store is untouched when the
/// document does not parse. Returns the fresh ids in backup order.
pub fn import_all(store: &mut ProfileStore, json: &str) -> Result<Vec<String>> {
    let contents = parse_backup(json)?;
    let ids = store.replace_all(contents.multi_select, &contents.common, contents.profiles)?;
    log::info!("Imported backup with {} profiles", ids.len());
    Ok(ids)
}
