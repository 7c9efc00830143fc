use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StoreSettings;
use crate::error::{HostlyError, Result};
use crate::hosts::{stage_atomic, write_atomic, SystemHostsWriter};
use crate::profile_metadata::{AppConfig, ProfileMetadata, ProfileSource};

const PROFILES_DIR: &str = "profiles";
const COMMON_FILE: &str = "common.txt";
const BACKUP_PROFILE_NAME: &str = "System Hosts Backup";
const BACKUP_FAILED: &str = "# Backup failed";

/// A profile with its content, as handed to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub content: String,
    pub active: bool,
    pub source: ProfileSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Profile {
    fn from_parts(meta: &ProfileMetadata, content: &str) -> Self {
        Self {
            id: meta.id.clone(),
            name: meta.name.clone(),
            content: content.to_string(),
            active: meta.active,
            source: meta.source.clone(),
            last_update: meta.last_update,
        }
    }
}

/// A profile about to be added by an importer; ids are always assigned fresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProfile {
    pub name: String,
    pub content: String,
    pub active: bool,
    pub source: ProfileSource,
    pub last_update: Option<DateTime<Utc>>,
}

/// Outcome of storing a fetch result for a profile that still exists
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub previous: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub active: bool,
}

/// Everything composition needs, copied out of the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionInput {
    pub common: String,
    pub active: Vec<Profile>,
}

/// Durable profile catalog
///
/// Not synchronized on its own; callers hold it behind a single lock so every
/// mutation is one serialized transaction. Each catalog change is prepared on a
/// copy and only swapped in after it reached disk.
pub struct ProfileStore {
    base_dir: PathBuf,
    config: AppConfig,
    common: String,
    contents: HashMap<String, String>,
}

impl ProfileStore {
    /// Open the store, seeding a fresh catalog on first run
    pub fn open(
        base_dir: PathBuf,
        settings: &StoreSettings,
        system: &SystemHostsWriter,
    ) -> Result<Self> {
        fs::create_dir_all(base_dir.join(PROFILES_DIR))?;

        let common = read_optional(&base_dir.join(COMMON_FILE))?.unwrap_or_default();

        let mut store = Self {
            base_dir,
            config: AppConfig::default(),
            common,
            contents: HashMap::new(),
        };

        match AppConfig::load(&store.base_dir)? {
            Some(config) => {
                for meta in &config.profiles {
                    let content = read_optional(&store.profile_path(&meta.id))?.unwrap_or_default();
                    store.contents.insert(meta.id.clone(), content);
                }
                store.config = config;
            }
            None => store.seed(settings, system)?,
        }

        Ok(store)
    }

    fn seed(&mut self, settings: &StoreSettings, system: &SystemHostsWriter) -> Result<()> {
        let backup = system.read_effective().unwrap_or_else(|e| {
            log::warn!("Could not back up system hosts: {}", e);
            BACKUP_FAILED.to_string()
        });

        let mut seeded = vec![NewProfile {
            name: BACKUP_PROFILE_NAME.to_string(),
            content: backup,
            ..Default::default()
        }];
        seeded.extend(settings.default_profiles.iter().map(|name| NewProfile {
            name: name.clone(),
            content: "# New Environment\n".to_string(),
            ..Default::default()
        }));

        write_atomic(&self.base_dir.join(COMMON_FILE), self.common.as_bytes())?;
        self.append(seeded)?;
        log::info!("Seeded profile catalog in {}", self.base_dir.display());
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn profile_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(PROFILES_DIR).join(format!("{}.txt", id))
    }

    /// Apply `change` to a copy of the catalog, persist it, then swap it in
    fn commit<T>(&mut self, change: impl FnOnce(&mut AppConfig) -> Result<T>) -> Result<T> {
        let mut next = self.config.clone();
        let out = change(&mut next)?;
        next.save(&self.base_dir)?;
        self.config = next;
        Ok(out)
    }

    fn write_content(&mut self, id: &str, content: &str) -> Result<()> {
        write_atomic(&self.profile_path(id), content.as_bytes())?;
        self.contents.insert(id.to_string(), content.to_string());
        Ok(())
    }

    fn require(&self, id: &str) -> Result<&ProfileMetadata> {
        self.config.get(id).ok_or_else(|| HostlyError::not_found(id))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn app_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn multi_select(&self) -> bool {
        self.config.multi_select
    }

    pub fn common(&self) -> &str {
        &self.common
    }

    pub fn content(&self, id: &str) -> Option<&str> {
        self.contents.get(id).map(|s| s.as_str())
    }

    pub fn get(&self, id: &str) -> Result<Profile> {
        let meta = self.require(id)?;
        Ok(Profile::from_parts(meta, self.content(id).unwrap_or_default()))
    }

    /// All profiles in catalog order
    pub fn list(&self) -> Vec<Profile> {
        self.config
            .profiles
            .iter()
            .map(|meta| Profile::from_parts(meta, self.content(&meta.id).unwrap_or_default()))
            .collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.config.get(id).is_some_and(|p| p.active)
    }

    pub fn composition_input(&self) -> CompositionInput {
        CompositionInput {
            common: self.common.clone(),
            active: self
                .config
                .active()
                .map(|meta| Profile::from_parts(meta, self.content(&meta.id).unwrap_or_default()))
                .collect(),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a profile; remote profiles start empty until fetched
    pub fn create(
        &mut self,
        name: &str,
        content: Option<&str>,
        source: ProfileSource,
    ) -> Result<String> {
        let content = if source.is_remote() {
            ""
        } else {
            content.unwrap_or_default()
        };
        let ids = self.append(vec![NewProfile {
            name: name.to_string(),
            content: content.to_string(),
            source,
            ..Default::default()
        }])?;
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    /// Append profiles in order, activating the flagged ones through the
    /// normal rules (in single-select mode the last flagged one stays active)
    pub fn append(&mut self, profiles: Vec<NewProfile>) -> Result<Vec<String>> {
        let metas = self.stage_contents(profiles)?;
        let ids: Vec<String> = metas.iter().map(|m| m.id.clone()).collect();

        let result = self.commit(|config| {
            for mut meta in metas {
                if meta.active {
                    if !config.multi_select {
                        config.profiles.iter_mut().for_each(|p| p.active = false);
                    }
                    meta.activation_seq = config.next_activation_seq();
                }
                config.profiles.push(meta);
            }
            Ok(())
        });

        if let Err(e) = result {
            for id in &ids {
                self.discard_content(id);
            }
            return Err(e);
        }
        Ok(ids)
    }

    /// Write content for new profiles under fresh ids. Nothing is left on
    /// disk when a write fails.
    fn stage_contents(&mut self, profiles: Vec<NewProfile>) -> Result<Vec<ProfileMetadata>> {
        let mut metas: Vec<ProfileMetadata> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let id = self.fresh_id();
            if let Err(e) = self.write_content(&id, &profile.content) {
                for meta in &metas {
                    self.discard_content(&meta.id);
                }
                return Err(e);
            }
            let mut meta = ProfileMetadata::new(id, profile.name, profile.source);
            meta.active = profile.active;
            meta.last_update = profile.last_update;
            metas.push(meta);
        }
        Ok(metas)
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.config.contains(&id) && !self.contents.contains_key(&id) {
                return id;
            }
        }
    }

    fn discard_content(&mut self, id: &str) {
        self.contents.remove(id);
        if let Err(e) = fs::remove_file(self.profile_path(id)) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove content of profile {}: {}", id, e);
            }
        }
    }

    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<()> {
        self.require(id)?;
        self.commit(|config| {
            if let Some(p) = config.get_mut(id) {
                p.name = new_name.to_string();
            }
            Ok(())
        })
    }

    pub fn set_content(&mut self, id: &str, content: &str) -> Result<()> {
        self.require(id)?;
        self.write_content(id, content)
    }

    pub fn set_common(&mut self, content: &str) -> Result<()> {
        write_atomic(&self.base_dir.join(COMMON_FILE), content.as_bytes())?;
        self.common = content.to_string();
        Ok(())
    }

    /// Flip activation. In single-select mode activating deactivates every
    /// other profile in the same transition. Returns the new state.
    pub fn toggle_active(&mut self, id: &str) -> Result<bool> {
        let was_active = self.require(id)?.active;
        self.commit(|config| {
            let seq = config.next_activation_seq();
            if !config.multi_select && !was_active {
                config.profiles.iter_mut().for_each(|p| p.active = false);
            }
            if let Some(p) = config.get_mut(id) {
                p.active = !was_active;
                if p.active {
                    p.activation_seq = seq;
                }
            }
            Ok(!was_active)
        })
    }

    /// Delete a profile and its active membership. Returns whether it was active.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let was_active = self.require(id)?.active;
        self.commit(|config| {
            config.profiles.retain(|p| p.id != id);
            Ok(())
        })?;
        self.discard_content(id);
        Ok(was_active)
    }

    /// Switch selection mode. Leaving multi-select keeps only the most recently
    /// activated profile (ties go to the earliest in catalog order).
    /// Returns whether the active set changed.
    pub fn set_multi_select(&mut self, enable: bool) -> Result<bool> {
        self.commit(|config| {
            config.multi_select = enable;
            Ok(!enable && config.collapse_to_single())
        })
    }

    /// Change the remote source; a missing URL turns the profile local and
    /// keeps its content
    pub fn update_remote_config(
        &mut self,
        id: &str,
        url: Option<String>,
        interval: Option<u64>,
    ) -> Result<()> {
        self.require(id)?;
        let source = ProfileSource::from_parts(url, interval);
        self.commit(|config| {
            if let Some(p) = config.get_mut(id) {
                p.source = source;
            }
            Ok(())
        })
    }

    /// Store fetched content. Returns `None` without writing anything when the
    /// profile was deleted while the fetch was running.
    pub fn record_fetch_result(
        &mut self,
        id: &str,
        content: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Option<FetchRecord>> {
        let Some(meta) = self.config.get(id) else {
            return Ok(None);
        };
        let previous = meta.last_update;
        let last_update = previous.map_or(fetched_at, |prev| prev.max(fetched_at));

        self.write_content(id, content)?;
        let active = self.commit(|config| {
            let p = config.get_mut(id).ok_or_else(|| HostlyError::not_found(id))?;
            p.last_update = Some(last_update);
            Ok(p.active)
        })?;

        Ok(Some(FetchRecord {
            previous,
            last_update,
            active,
        }))
    }

    /// Swap the whole catalog for `profiles`, assigning fresh ids
    ///
    /// The common block and the new contents are staged first and only take
    /// effect once the catalog save succeeds.
    pub fn replace_all(
        &mut self,
        multi_select: bool,
        common: &str,
        profiles: Vec<NewProfile>,
    ) -> Result<Vec<String>> {
        let old_ids: Vec<String> = self.config.profiles.iter().map(|p| p.id.clone()).collect();

        let common_path = self.base_dir.join(COMMON_FILE);
        let staged_common = stage_atomic(&common_path, common.as_bytes())?;
        let metas = self.stage_contents(profiles)?;
        let ids: Vec<String> = metas.iter().map(|m| m.id.clone()).collect();

        let result = self.commit(|config| {
            config.multi_select = multi_select;
            config.profiles = metas;
            if !multi_select {
                config.collapse_to_single();
            }
            Ok(())
        });
        if let Err(e) = result {
            for id in &ids {
                self.discard_content(id);
            }
            return Err(e);
        }

        for id in old_ids {
            self.discard_content(&id);
        }

        staged_common.persist(&common_path).map_err(|e| e.error)?;
        self.common = common.to_string();
        Ok(ids)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
