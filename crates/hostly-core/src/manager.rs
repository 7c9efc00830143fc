//! Hosts Manager
//!
//! Owns the profile store and the system hosts writer, and provides the one
//! path through which composed text reaches the system file. Every caller that
//! needs an apply (profile edits, toggles, fetch completions) goes through
//! [`HostsManager::apply`], which serializes writers and snapshots the store
//! under its own lock, so the written file always matches a single state.
//!
//! Lock order: the apply lock may take the store lock, never the reverse.
//! Callers must drop any store guard before calling `apply`.

use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

use crate::compose::{compose, content_digest};
use crate::error::Result;
use crate::hosts::SystemHostsWriter;
use crate::profile::ProfileStore;

/// Emitted only when something observable actually changed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A fetch advanced `last_update`
    ProfileFetched {
        id: String,
        previous: Option<DateTime<Utc>>,
        last_update: DateTime<Utc>,
    },
    /// The system hosts file now holds a different composition
    HostsApplied { digest: String },
}

pub struct HostsManager {
    store: Mutex<ProfileStore>,
    writer: SystemHostsWriter,
    /// Digest of the last composition written; the lock doubles as the apply lock
    applied: Mutex<Option<String>>,
    last_apply_error: Mutex<Option<String>>,
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl HostsManager {
    pub fn new(store: ProfileStore, writer: SystemHostsWriter) -> Self {
        Self {
            store: Mutex::new(store),
            writer,
            applied: Mutex::new(None),
            last_apply_error: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Exclusive access to the store; every mutation goes through this lock
    pub fn store(&self) -> MutexGuard<'_, ProfileStore> {
        self.store.lock()
    }

    pub fn writer(&self) -> &SystemHostsWriter {
        &self.writer
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, event: ChangeEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Composition of the current store state
    pub fn composed(&self) -> String {
        let input = self.store().composition_input();
        compose(&input.common, &input.active)
    }

    /// Error text of the most recent failed apply, cleared by a successful one.
    /// While set, the system file no longer reflects the catalog.
    pub fn last_apply_error(&self) -> Option<String> {
        self.last_apply_error.lock().clone()
    }

    /// Compose the current state and write it to the system hosts file
    pub fn apply(&self) -> Result<()> {
        let mut applied = self.applied.lock();
        let text = self.composed();
        let digest = content_digest(&text);

        if let Err(e) = self.writer.apply(&text) {
            *self.last_apply_error.lock() = Some(e.to_string());
            return Err(e);
        }
        *self.last_apply_error.lock() = None;

        if applied.as_deref() != Some(digest.as_str()) {
            *applied = Some(digest.clone());
            drop(applied);
            self.notify(ChangeEvent::HostsApplied { digest });
        }
        Ok(())
    }

    /// Apply after a committed mutation. Failure does not undo the mutation;
    /// it is logged and kept as `last_apply_error`.
    pub fn apply_after_change(&self, reason: &str) {
        if let Err(e) = self.apply() {
            log::warn!("Hosts not applied after {}: {}", reason, e);
        }
    }

    /// Write operator-supplied text to the system file, outside composition
    pub fn save_manual(&self, text: &str) -> Result<()> {
        let mut applied = self.applied.lock();
        self.writer.save_manual(text)?;
        *applied = None;
        Ok(())
    }

    /// Record a completed fetch. Results for deleted profiles are dropped.
    pub fn record_fetch(&self, id: &str, content: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        let record = self.store().record_fetch_result(id, content, fetched_at)?;

        let Some(record) = record else {
            log::info!("Discarding fetch result for deleted profile {}", id);
            return Ok(());
        };

        if record.previous != Some(record.last_update) {
            self.notify(ChangeEvent::ProfileFetched {
                id: id.to_string(),
                previous: record.previous,
                last_update: record.last_update,
            });
        }

        if record.active {
            self.apply_after_change("remote update");
        }
        Ok(())
    }
}
