//! Hostly service
//!
//! One method per UI call. Mutations commit to the store first and then run
//! the apply path when the composed output may have changed; a failing
//! follow-up apply is recorded (see [`Hostly::last_apply_error`]) instead of
//! failing the mutation. `apply_config` and `save_system_hosts` report write
//! failures directly.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::hosts::SystemHostsWriter;
use crate::manager::{ChangeEvent, HostsManager};
use crate::profile::{Profile, ProfileStore};
use crate::profile_metadata::{AppConfig, ProfileSource};
use crate::remote::{
    validate_source_url, Clock, HttpFetcher, RemoteFetcher, SystemClock, UpdateScheduler,
};
use crate::transfer;

pub struct Hostly {
    base_dir: PathBuf,
    settings: Settings,
    manager: Arc<HostsManager>,
    scheduler: UpdateScheduler,
}

impl Hostly {
    /// Open the default base directory (`HOSTLY_BASE` or the platform data dir)
    pub fn open_default() -> Result<Self> {
        Self::open(Settings::default_base_dir()?)
    }

    /// Open with settings from `<base>/config.toml` and the HTTP fetcher
    pub fn open(base_dir: PathBuf) -> Result<Self> {
        let settings = Settings::load(&base_dir)?;
        let fetcher = Arc::new(HttpFetcher::from_settings(&settings.remote));
        Self::with_parts(base_dir, settings, fetcher, Arc::new(SystemClock))
    }

    pub fn with_parts(
        base_dir: PathBuf,
        settings: Settings,
        fetcher: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let writer = SystemHostsWriter::from_settings(&settings.hosts);
        let store = ProfileStore::open(base_dir.clone(), &settings.store, &writer)?;
        let manager = Arc::new(HostsManager::new(store, writer));
        let scheduler = UpdateScheduler::new(Arc::clone(&manager), fetcher, clock);

        Ok(Self {
            base_dir,
            settings,
            manager,
            scheduler,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<HostsManager> {
        &self.manager
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.manager.subscribe()
    }

    /// Set while the system file is out of date because an apply failed
    pub fn last_apply_error(&self) -> Option<String> {
        self.manager.last_apply_error()
    }

    /// Start automatic remote updates with the configured timing
    pub fn start_scheduler(&self) -> Result<()> {
        let remote = &self.settings.remote;
        self.scheduler.start(remote.tick(), remote.startup_delay())
    }

    pub fn stop_scheduler(&self) {
        self.scheduler.stop();
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn load_config(&self) -> AppConfig {
        self.manager.store().app_config().clone()
    }

    pub fn load_common_config(&self) -> String {
        self.manager.store().common().to_string()
    }

    pub fn list_profiles(&self) -> Vec<Profile> {
        self.manager.store().list()
    }

    /// Create a profile. A remote profile starts empty; it is fetched by the
    /// next tick when it has an interval, otherwise on a manual trigger.
    pub fn create_profile(
        &self,
        name: &str,
        content: Option<&str>,
        url: Option<String>,
        update_interval: Option<u64>,
    ) -> Result<String> {
        let source = checked_source(url, update_interval)?;
        self.manager.store().create(name, content, source)
    }

    pub fn rename_profile(&self, id: &str, new_name: &str) -> Result<()> {
        // Names appear in section headers of the composed file
        let active = {
            let mut store = self.manager.store();
            store.rename(id, new_name)?;
            store.is_active(id)
        };
        if active {
            self.manager.apply_after_change("rename");
        }
        Ok(())
    }

    /// Returns the new activation state
    pub fn toggle_profile_active(&self, id: &str) -> Result<bool> {
        let active = self.manager.store().toggle_active(id)?;
        self.manager.apply_after_change("toggle");
        Ok(active)
    }

    pub fn delete_profile(&self, id: &str) -> Result<()> {
        let was_active = self.manager.store().remove(id)?;
        if was_active {
            self.manager.apply_after_change("delete");
        }
        Ok(())
    }

    pub fn set_multi_select(&self, enable: bool) -> Result<()> {
        let changed = self.manager.store().set_multi_select(enable)?;
        if changed {
            self.manager.apply_after_change("selection mode change");
        }
        Ok(())
    }

    pub fn update_remote_config(
        &self,
        id: &str,
        url: Option<String>,
        update_interval: Option<u64>,
    ) -> Result<()> {
        let source = checked_source(url, update_interval)?;
        self.manager
            .store()
            .update_remote_config(id, source.url().map(str::to_string), source.interval())
    }

    /// Fetch a remote profile now
    pub fn trigger_profile_update(&self, id: &str) -> Result<()> {
        self.scheduler.trigger(id)
    }

    pub fn save_common_config(&self, content: &str) -> Result<()> {
        self.manager.store().set_common(content)?;
        self.manager.apply_after_change("common config change");
        Ok(())
    }

    pub fn save_profile_content(&self, id: &str, content: &str) -> Result<()> {
        let active = {
            let mut store = self.manager.store();
            store.set_content(id, content)?;
            store.is_active(id)
        };
        if active {
            self.manager.apply_after_change("content change");
        }
        Ok(())
    }

    // =========================================================================
    // System hosts
    // =========================================================================

    pub fn get_system_hosts(&self) -> Result<String> {
        self.manager.writer().read_effective()
    }

    /// Write `content` as-is. Any later profile change recomposes and
    /// overwrites it.
    pub fn save_system_hosts(&self, content: &str) -> Result<()> {
        self.manager.save_manual(content)
    }

    pub fn apply_config(&self) -> Result<()> {
        self.manager.apply()
    }

    pub fn check_write_permission(&self) -> bool {
        self.manager.writer().check_write_permission()
    }

    // =========================================================================
    // Import / export
    // =========================================================================

    pub fn export_data(&self) -> Result<String> {
        transfer::export_all(&self.manager.store())
    }

    /// Replace the catalog with a backup
    pub fn import_data(&self, json: &str) -> Result<()> {
        transfer::import_all(&mut self.manager.store(), json)?;
        self.manager.apply_after_change("backup import");
        Ok(())
    }

    /// Returns the number of profiles created
    pub fn import_switchhosts(&self, json: &str) -> Result<usize> {
        let (count, active_changed) = {
            let mut store = self.manager.store();
            let before = store.app_config().active_profile_ids.clone();
            let count = transfer::import_switchhosts(&mut store, json)?;
            (count, store.app_config().active_profile_ids != before)
        };
        if active_changed {
            self.manager.apply_after_change("SwitchHosts import");
        }
        Ok(count)
    }
}

/// Source from wire fields, rejecting URLs we would never fetch
fn checked_source(url: Option<String>, update_interval: Option<u64>) -> Result<ProfileSource> {
    let source = ProfileSource::from_parts(url, update_interval);
    if let Some(url) = source.url() {
        validate_source_url(url)?;
    }
    Ok(source)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::StoreSettings;
    use crate::remote::scheduler::testing::{FakeFetcher, ManualClock};
    use chrono::Utc;
    use std::fs;

    /// Service over `dir`, hosts at `dir/hosts`, no default profiles and the
    /// seeded backup removed
    pub fn hostly(dir: &Path, fetcher: Arc<FakeFetcher>) -> Hostly {
        let hosts = dir.join("hosts");
        fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();
        let mut settings = Settings::default();
        settings.hosts.path = Some(hosts);
        settings.store = StoreSettings {
            default_profiles: Vec::new(),
        };

        let hostly =
            Hostly::with_parts(dir.join("base"), settings, fetcher, ManualClock::new(Utc::now()))
                .unwrap();
        for profile in hostly.list_profiles() {
            hostly.delete_profile(&profile.id).unwrap();
        }
        hostly
    }
}
