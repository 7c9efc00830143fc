//! Remote update scheduling
//!
//! Each remote profile is either idle or fetching. A profile enters
//! `Fetching` through a due-check tick or a manual trigger and leaves it when
//! the fetch completes, whatever the outcome. At most one fetch per profile id
//! is in flight; different profiles fetch independently on their own threads.
//!
//! A profile whose background fetches keep failing is skipped by due-checks
//! for an exponentially growing delay. Manual triggers are not held back.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{HostlyError, Result};
use crate::manager::HostsManager;
use crate::remote::fetcher::RemoteFetcher;

/// Time source for due-checks and fetch timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whether a profile should be fetched automatically at `now`
///
/// Profiles without an interval are only ever updated manually.
pub fn is_due(
    last_update: Option<DateTime<Utc>>,
    interval: Option<u64>,
    now: DateTime<Utc>,
) -> bool {
    let Some(interval) = interval else {
        return false;
    };
    let Some(last) = last_update else {
        return true;
    };

    // An interval too large for chrono never elapses
    i64::try_from(interval)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .is_some_and(|period| now.signed_duration_since(last) >= period)
}

/// First retry delay after a failed background fetch; doubles per failure
const BACKOFF_BASE_SECS: i64 = 30;
const BACKOFF_MAX_SECS: i64 = 60 * 60;

/// Wait before the next automatic attempt after `failures` consecutive failures
fn backoff_delay(failures: u32) -> chrono::Duration {
    let doublings = failures.saturating_sub(1).min(16);
    let secs = (BACKOFF_BASE_SECS << doublings).min(BACKOFF_MAX_SECS);
    chrono::Duration::seconds(secs)
}

/// Consecutive background failures of one profile
#[derive(Debug, Clone, Copy)]
struct Backoff {
    failures: u32,
    retry_at: DateTime<Utc>,
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks a profile as fetching until dropped
struct FetchGuard {
    in_flight: InFlight,
    id: String,
}

impl FetchGuard {
    fn try_begin(in_flight: &InFlight, id: &str) -> Option<Self> {
        if !in_flight.lock().insert(id.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            id: id.to_string(),
        })
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.id);
    }
}

struct Inner {
    manager: Arc<HostsManager>,
    fetcher: Arc<dyn RemoteFetcher>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    backoff: Mutex<HashMap<String, Backoff>>,
}

impl Inner {
    /// Fetch and record. Callers hold the profile's `FetchGuard` until this
    /// returns and any failure has been noted.
    fn run_fetch(&self, id: &str, url: &str) -> Result<()> {
        let text = self.fetcher.fetch(url)?;
        let fetched_at = self.clock.now();
        self.manager.record_fetch(id, &text, fetched_at)?;
        self.backoff.lock().remove(id);
        log::info!("Updated remote profile {} from {}", id, url);
        Ok(())
    }

    /// Push back the next automatic attempt. Only the first failure in a row
    /// is logged as a warning.
    fn note_failure(&self, id: &str, err: &HostlyError) {
        let now = self.clock.now();
        let mut backoff = self.backoff.lock();
        let entry = backoff.entry(id.to_string()).or_insert(Backoff {
            failures: 0,
            retry_at: now,
        });
        entry.failures = entry.failures.saturating_add(1);
        let delay = backoff_delay(entry.failures);
        entry.retry_at = now + delay;

        if entry.failures == 1 {
            log::warn!("Background update of profile {} failed: {}", id, err);
        } else {
            log::debug!(
                "Background update of profile {} failed {} times, retrying in {}s: {}",
                id,
                entry.failures,
                delay.num_seconds(),
                err
            );
        }
    }

    fn backing_off(backoff: &HashMap<String, Backoff>, id: &str, now: DateTime<Utc>) -> bool {
        backoff.get(id).is_some_and(|b| now < b.retry_at)
    }

    /// Remote profiles that are due and not already fetching, as (id, url)
    fn due_profiles(&self) -> Vec<(String, String)> {
        let now = self.clock.now();
        let store = self.manager.store();
        let in_flight = self.in_flight.lock();
        let mut backoff = self.backoff.lock();
        backoff.retain(|id, _| store.app_config().contains(id));

        store
            .app_config()
            .profiles
            .iter()
            .filter(|p| !in_flight.contains(&p.id))
            .filter(|p| !Self::backing_off(&backoff, &p.id, now))
            .filter_map(|p| {
                let url = p.source.url()?;
                let due = is_due(p.last_update, p.source.interval(), now);
                log::debug!("Due-check {}: {}", p.id, due);
                due.then(|| (p.id.clone(), url.to_string()))
            })
            .collect()
    }

    fn tick(this: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (id, url) in this.due_profiles() {
            let Some(guard) = FetchGuard::try_begin(&this.in_flight, &id) else {
                continue;
            };

            let inner = Arc::clone(this);
            let spawned = thread::Builder::new()
                .name("hostly-fetch".to_string())
                .spawn(move || {
                    let _guard = guard;
                    if let Err(e) = inner.run_fetch(&id, &url) {
                        inner.note_failure(&id, &e);
                    }
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::warn!("Could not start fetch thread: {}", e),
            }
        }
        handles
    }
}

struct Runner {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Drives remote profile updates
pub struct UpdateScheduler {
    inner: Arc<Inner>,
    runner: Mutex<Option<Runner>>,
}

impl UpdateScheduler {
    pub fn new(
        manager: Arc<HostsManager>,
        fetcher: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manager,
                fetcher,
                clock,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                backoff: Mutex::new(HashMap::new()),
            }),
            runner: Mutex::new(None),
        }
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.inner.in_flight.lock().contains(id)
    }

    /// Fetch one profile now, on the calling thread
    ///
    /// Fails `AlreadyInProgress` while another fetch for the same id runs.
    /// If the profile is deleted mid-fetch the result is dropped and this
    /// still returns `Ok`.
    pub fn trigger(&self, id: &str) -> Result<()> {
        let source = self.inner.manager.store().get(id)?.source;
        let url = source.url().ok_or_else(|| {
            HostlyError::invalid_format(format!("Profile {} has no remote source", id))
        })?;

        let _guard = FetchGuard::try_begin(&self.inner.in_flight, id).ok_or_else(|| {
            HostlyError::AlreadyInProgress { id: id.to_string() }
        })?;

        self.inner.run_fetch(id, url)
    }

    /// Start fetches for every due profile; returns the worker handles
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        Inner::tick(&self.inner)
    }

    pub fn is_running(&self) -> bool {
        self.runner.lock().is_some()
    }

    /// Start the coordinating thread. Does nothing if already running.
    pub fn start(&self, tick: Duration, startup_delay: Duration) -> Result<()> {
        let mut runner = self.runner.lock();
        if runner.is_some() {
            return Ok(());
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("hostly-scheduler".to_string())
            .spawn(move || {
                let delayed = stopped.recv_timeout(startup_delay);
                if !matches!(delayed, Err(RecvTimeoutError::Timeout)) {
                    return;
                }
                loop {
                    // Workers run detached; the tick never waits on a fetch
                    Inner::tick(&inner);
                    match stopped.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
            })?;

        log::info!("Update scheduler started (tick {:?})", tick);
        *runner = Some(Runner { stop, handle });
        Ok(())
    }

    /// Stop the coordinating thread and wait for it. In-flight fetches finish
    /// on their own threads.
    pub fn stop(&self) {
        let Some(runner) = self.runner.lock().take() else {
            return;
        };
        let _ = runner.stop.send(());
        if runner.handle.join().is_err() {
            log::warn!("Update scheduler thread panicked");
        }
        log::info!("Update scheduler stopped");
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Clock that only moves when told to
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        pub fn advance(&self, secs: i64) {
            *self.now.lock() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }

    type Respond = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

    /// Fetcher with scripted responses that can hold a fetch open
    pub struct FakeFetcher {
        pub calls: AtomicUsize,
        respond: Respond,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl FakeFetcher {
        pub fn new(respond: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                respond: Box::new(respond),
                gate: Mutex::new(None),
            })
        }

        pub fn serving(body: &'static str) -> Arc<Self> {
            Self::new(move |_| Ok(body.to_string()))
        }

        /// Make the next fetch signal `started` and then block until `release` fires
        pub fn hold_next(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (started_tx, started_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            *self.gate.lock() = Some((started_tx, release_rx));
            (started_rx, release_tx)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().take();
            if let Some((started, release)) = gate {
                let _ = started.send(());
                let _ = release.recv_timeout(Duration::from_secs(10));
            }
            (self.respond)(url)
        }
    }
}
