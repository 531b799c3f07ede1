//! Atomically swappable policy snapshot and file hot-reload.
//!
//! Requests take one `Arc<Policy>` snapshot and decide against it; a reload
//! builds a complete new [`Policy`] and swaps the pointer. A policy is never
//! mutated in place, so an in-flight request always sees one consistent
//! policy.
//!
//! A reload that fails to parse leaves the current policy in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::rbac::policy::Policy;
use crate::{Error, Result};

/// Quiet period after the last file event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Live snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Shared, atomically replaceable policy.
///
/// Readers take a read-lock and clone the inner `Arc`; writers swap the whole
/// `Arc` under a write-lock.
#[derive(Debug)]
pub struct LivePolicy {
    inner: RwLock<Arc<Policy>>,
}

impl LivePolicy {
    /// Seed with the startup policy.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self {
            inner: RwLock::new(Arc::new(policy)),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Policy> {
        Arc::clone(&self.inner.read())
    }

    /// Replace the whole policy.
    pub fn replace(&self, policy: Policy) {
        *self.inner.write() = Arc::new(policy);
    }
}

impl From<Policy> for LivePolicy {
    fn from(policy: Policy) -> Self {
        Self::new(policy)
    }
}

/// Re-read `path` and swap it into `live`.
///
/// # Errors
///
/// Propagates load errors; `live` is untouched in that case.
pub fn reload_policy(path: &Path, live: &LivePolicy) -> Result<()> {
    let policy = Policy::from_file(path)?;
    let roles = policy.len();

    if *live.get() == policy {
        debug!(path = %path.display(), "Policy reload: no changes detected");
        return Ok(());
    }

    live.replace(policy);
    info!(path = %path.display(), roles, "Policy reloaded");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// File watcher
// ─────────────────────────────────────────────────────────────────────────────

/// Watches the policy file and reloads it on change.
///
/// Holds the underlying `notify` watcher alive for the lifetime of the struct.
pub struct PolicyWatcher {
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl PolicyWatcher {
    /// Start watching `policy_path`.
    ///
    /// Spawns a debounced background task on the current tokio runtime that
    /// calls [`reload_policy`] after each burst of changes, and stops when
    /// `shutdown_rx` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the `notify` watcher cannot be created.
    pub fn start(
        policy_path: PathBuf,
        live: Arc<LivePolicy>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(32);

        let watcher = Self::create_notify_watcher(event_tx, &policy_path)?;
        Self::spawn_reload_task(policy_path, live, event_rx, shutdown_rx);

        Ok(Self {
            _watcher: Mutex::new(Some(watcher)),
        })
    }

    fn create_notify_watcher(
        event_tx: mpsc::Sender<()>,
        policy_path: &Path,
    ) -> Result<RecommendedWatcher> {
        // Editors often replace files by rename, so watch the parent directory.
        let watch_dir = policy_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let path_for_closure = policy_path.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_policy_event(&event, &path_for_closure) => {
                    // Non-blocking; a full channel already has a reload pending.
                    let _ = event_tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Policy watcher error"),
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| Error::Internal(format!("Failed to create policy watcher: {e}")))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Internal(format!("Failed to watch policy path: {e}")))?;

        info!(path = %policy_path.display(), "Watching policy for changes");
        Ok(watcher)
    }

    fn spawn_reload_task(
        policy_path: PathBuf,
        live: Arc<LivePolicy>,
        mut event_rx: mpsc::Receiver<()>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            let mut last_event: Option<Instant> = None;
            let mut ticker = tokio::time::interval(Duration::from_millis(100));

            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        last_event = Some(Instant::now());
                    }
                    _ = ticker.tick() => {
                        if last_event.is_some_and(|t| t.elapsed() >= DEBOUNCE) {
                            last_event = None;
                            if let Err(e) = reload_policy(&policy_path, &live) {
                                warn!(error = %e, "Policy reload failed, keeping current policy");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Policy watcher shutting down");
                        break;
                    }
                }
            }
        });
    }
}

/// Create/modify events touching the watched file.
fn is_policy_event(event: &Event, policy_path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p == policy_path || p.file_name() == policy_path.file_name())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::rbac::policy::Role;

    fn policy_v1() -> Policy {
        Policy::from_roles([("api1", Role::new().with_resource("/users", ["GET"]))])
    }

    #[test]
    fn get_returns_seeded_policy() {
        let live = LivePolicy::new(policy_v1());
        assert_eq!(*live.get(), policy_v1());
    }

    #[test]
    fn replace_swaps_without_touching_held_snapshots() {
        // GIVEN: a request holding the v1 snapshot
        let live = LivePolicy::new(policy_v1());
        let in_flight = live.get();

        // WHEN: the policy is replaced
        live.replace(Policy::from_roles([("api2", Role::new())]));

        // THEN: the held snapshot still sees v1, new readers see v2
        assert_eq!(in_flight.check_permission("api1", "/users", "GET"), Ok(true));
        assert!(live.get().check_permission("api1", "/users", "GET").is_err());
        assert!(live.get().role("api2").is_some());
    }

    #[test]
    fn reload_policy_swaps_in_new_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.json");
        fs::write(
            &path,
            r#"{"roles": {"api1": {"permissions": {"/users": ["GET", "DELETE"]}}}}"#,
        )
        .unwrap();

        let live = LivePolicy::new(policy_v1());
        reload_policy(&path, &live).unwrap();

        assert_eq!(live.get().check_permission("api1", "/users", "DELETE"), Ok(true));
    }

    #[test]
    fn reload_policy_failure_keeps_current_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.json");
        fs::write(&path, r#"{"roles": {"api1": "#).unwrap();

        let live = LivePolicy::new(policy_v1());
        let err = reload_policy(&path, &live).unwrap_err();

        assert!(err.is_policy_error());
        assert_eq!(*live.get(), policy_v1());
    }

    #[test]
    fn reload_policy_missing_file_keeps_current_policy() {
        let live = LivePolicy::new(policy_v1());
        assert!(reload_policy(Path::new("/nonexistent/rbac.json"), &live).is_err());
        assert_eq!(*live.get(), policy_v1());
    }

    #[test]
    fn policy_event_filter_matches_file_only() {
        let path = PathBuf::from("/etc/rbac/rbac.json");
        let modify = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/rbac/rbac.json"));
        let other = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/rbac/other.json"));
        let remove = Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
            .add_path(PathBuf::from("/etc/rbac/rbac.json"));

        assert!(is_policy_event(&modify, &path));
        assert!(!is_policy_event(&other, &path));
        assert!(!is_policy_event(&remove, &path));
    }

    #[tokio::test]
    async fn watcher_starts_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.json");
        fs::write(&path, r#"{"roles": {}}"#).unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        let live = Arc::new(LivePolicy::new(Policy::default()));
        let watcher = PolicyWatcher::start(path, live, shutdown_tx.subscribe());
        assert!(watcher.is_ok());

        let _ = shutdown_tx.send(());
    }
}
