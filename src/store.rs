//! Cache entry state and the page store.
//!
//! The store owns every [`PageEntry`] outright. Entries are never evicted:
//! the map grows with the set of distinct keys ever requested.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::flight::{FlightSubscription, RenderFlight};
use crate::keys::PageKey;
use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "store";

/// Cache state for a single page key.
#[derive(Debug, Clone, Default)]
pub struct PageEntry {
    /// True while a render (first render or background refresh) is in
    /// flight for this key.
    pub revalidating: bool,
    /// Absolute path of the last persisted artifact.
    pub artifact: Option<PathBuf>,
    /// When the artifact was last persisted; set together with `artifact`.
    pub rendered_at: Option<Instant>,
    /// Waiter fan-out; present only during a first render.
    pub flight: Option<RenderFlight>,
}

impl PageEntry {
    fn first_render() -> Self {
        Self {
            revalidating: true,
            flight: Some(RenderFlight::new()),
            ..Default::default()
        }
    }
}

/// Outcome of the dispatch decision for one request.
#[derive(Debug)]
pub enum Dispatch {
    /// No entry existed; the caller owns the first render.
    FirstRender,
    /// A first render is in flight; wait for it, then serve its artifact.
    Wait(FlightSubscription),
    /// An artifact exists; serve it, spawning a refresh when `revalidate`.
    Serve {
        artifact: PathBuf,
        revalidate: bool,
    },
    /// A render started but never completed, and no waiters remain.
    Dead,
}

/// Process-wide mapping from page key to cache entry.
#[derive(Debug, Default)]
pub struct PageStore {
    entries: RwLock<HashMap<PageKey, PageEntry>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entry for `key`.
    pub fn get(&self, key: &PageKey) -> Option<PageEntry> {
        rw_read(&self.entries, SOURCE, "get").get(key).cloned()
    }

    /// Replace the entry for `key` wholesale.
    pub fn insert(&self, key: PageKey, entry: PageEntry) {
        rw_write(&self.entries, SOURCE, "insert").insert(key, entry);
    }

    /// Decide how to handle a request for `key`.
    ///
    /// The whole read-decide-mutate sequence runs under one write guard, so
    /// the check-then-set of `revalidating` cannot race a concurrent request
    /// for the same key. Waiters subscribe under the same guard.
    pub fn begin(&self, key: &PageKey, max_age: Duration) -> Dispatch {
        let mut entries = rw_write(&self.entries, SOURCE, "begin");

        let Some(entry) = entries.get_mut(key) else {
            entries.insert(key.clone(), PageEntry::first_render());
            return Dispatch::FirstRender;
        };

        if let Some(artifact) = entry.artifact.clone() {
            let stale = entry.rendered_at.is_none_or(|at| at.elapsed() >= max_age);
            let revalidate = stale && !entry.revalidating;
            if revalidate {
                entry.revalidating = true;
            }
            return Dispatch::Serve {
                artifact,
                revalidate,
            };
        }

        match &entry.flight {
            Some(flight) => Dispatch::Wait(flight.subscribe()),
            None => Dispatch::Dead,
        }
    }

    /// Apply a completing render's update: set the artifact and timestamp,
    /// clear `revalidating`, and hand the released flight (if any) back to
    /// the caller for resolution. Fields not named here keep their values.
    pub fn complete_render(&self, key: &PageKey, artifact: PathBuf) -> Option<RenderFlight> {
        let mut entries = rw_write(&self.entries, SOURCE, "complete_render");

        match entries.get_mut(key) {
            Some(entry) => {
                entry.revalidating = false;
                entry.artifact = Some(artifact);
                entry.rendered_at = Some(Instant::now());
                entry.flight.take()
            }
            None => {
                warn!(page_key = %key, "completed a render for a key with no entry");
                entries.insert(
                    key.clone(),
                    PageEntry {
                        revalidating: false,
                        artifact: Some(artifact),
                        rendered_at: Some(Instant::now()),
                        flight: None,
                    },
                );
                None
            }
        }
    }

    /// Number of keys ever cached.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> PageKey {
        PageKey::from_path(path)
    }

    #[test]
    fn miss_creates_a_revalidating_entry() {
        let store = PageStore::new();

        assert!(matches!(
            store.begin(&key("/a"), Duration::from_secs(10)),
            Dispatch::FirstRender
        ));

        let entry = store.get(&key("/a")).expect("entry created");
        assert!(entry.revalidating);
        assert!(entry.artifact.is_none());
        assert!(entry.flight.is_some());
    }

    #[test]
    fn second_request_during_first_render_waits() {
        let store = PageStore::new();
        let max_age = Duration::from_secs(10);

        store.begin(&key("/a"), max_age);
        assert!(matches!(store.begin(&key("/a"), max_age), Dispatch::Wait(_)));
        // still a single entry, single render
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn completion_merges_and_releases_the_flight() {
        let store = PageStore::new();
        store.begin(&key("/a"), Duration::from_secs(10));

        let flight = store
            .complete_render(&key("/a"), PathBuf::from("/tmp/a.html"))
            .expect("flight released");
        assert!(!flight.is_resolved());

        let entry = store.get(&key("/a")).expect("entry");
        assert!(!entry.revalidating);
        assert_eq!(entry.artifact, Some(PathBuf::from("/tmp/a.html")));
        assert!(entry.rendered_at.is_some());
        assert!(entry.flight.is_none());
    }

    #[test]
    fn fresh_artifact_serves_without_revalidation() {
        let store = PageStore::new();
        store.begin(&key("/a"), Duration::from_secs(60));
        store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));

        match store.begin(&key("/a"), Duration::from_secs(60)) {
            Dispatch::Serve {
                artifact,
                revalidate,
            } => {
                assert_eq!(artifact, PathBuf::from("/tmp/a.html"));
                assert!(!revalidate);
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn stale_artifact_triggers_exactly_one_revalidation() {
        let store = PageStore::new();
        store.begin(&key("/a"), Duration::ZERO);
        store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));

        match store.begin(&key("/a"), Duration::ZERO) {
            Dispatch::Serve { revalidate, .. } => assert!(revalidate),
            other => panic!("expected Serve, got {other:?}"),
        }

        // the refresh is now in flight; further requests serve without
        // starting another one
        match store.begin(&key("/a"), Duration::ZERO) {
            Dispatch::Serve { revalidate, .. } => assert!(!revalidate),
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn refresh_completion_reopens_revalidation() {
        let store = PageStore::new();
        store.begin(&key("/a"), Duration::ZERO);
        store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));

        store.begin(&key("/a"), Duration::ZERO);
        let flight = store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));
        assert!(flight.is_none());

        match store.begin(&key("/a"), Duration::ZERO) {
            Dispatch::Serve { revalidate, .. } => assert!(revalidate),
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn revalidation_keeps_the_artifact_available() {
        let store = PageStore::new();
        store.begin(&key("/a"), Duration::ZERO);
        store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));
        store.begin(&key("/a"), Duration::ZERO);

        let entry = store.get(&key("/a")).expect("entry");
        assert!(entry.revalidating);
        assert_eq!(entry.artifact, Some(PathBuf::from("/tmp/a.html")));
    }

    #[test]
    fn dead_entry_is_reported() {
        let store = PageStore::new();
        store.insert(key("/ghost"), PageEntry::default());

        assert!(matches!(
            store.begin(&key("/ghost"), Duration::from_secs(10)),
            Dispatch::Dead
        ));
    }

    #[test]
    fn completion_for_unknown_key_inserts_the_entry() {
        let store = PageStore::new();

        let flight = store.complete_render(&key("/a"), PathBuf::from("/tmp/a.html"));
        assert!(flight.is_none());

        let entry = store.get(&key("/a")).expect("entry");
        assert!(!entry.revalidating);
        assert_eq!(entry.artifact, Some(PathBuf::from("/tmp/a.html")));
    }

    #[test]
    fn entries_accumulate_per_key() {
        let store = PageStore::new();
        assert!(store.is_empty());

        store.begin(&key("/a"), Duration::from_secs(10));
        store.begin(&key("/b"), Duration::from_secs(10));

        assert_eq!(store.len(), 2);
    }
}
