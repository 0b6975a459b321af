//! Token economics tracking
//!
//! Records, per retrieval call, what discovery (index and timeline
//! reads) cost versus full-detail reads, and how much a full-detail read
//! of every surfaced candidate would have cost. The difference is the
//! saving the progressive-disclosure design is supposed to deliver.
//! Counters are append-only and reset only on an explicit user command.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::EntityStore;

const ECONOMICS_FILE: &str = "economics.json";
const ECONOMICS_LOCK: &str = "economics";

/// Cost measurements for a single retrieval call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetrievalSample {
    /// Tokens spent on Layer-1 and Layer-2 reads
    pub discovery_tokens: u64,
    /// Tokens spent on Layer-3 full reads
    pub full_tokens: u64,
    /// Estimated tokens a full read of every surfaced candidate would
    /// have cost
    pub full_equivalent_tokens: u64,
}

/// Cumulative per-namespace counters, persisted as a sidecar file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EconomicsCounters {
    /// Number of retrieval calls recorded
    pub retrievals: u64,
    pub discovery_tokens: u64,
    pub full_tokens: u64,
    pub full_equivalent_tokens: u64,
}

impl EconomicsCounters {
    /// Fold one retrieval into the counters. Values only ever grow.
    pub fn record(&mut self, sample: RetrievalSample) {
        self.retrievals += 1;
        self.discovery_tokens += sample.discovery_tokens;
        self.full_tokens += sample.full_tokens;
        self.full_equivalent_tokens += sample.full_equivalent_tokens;
    }

    /// Tokens avoided by reading summaries instead of full records.
    pub fn savings(&self) -> u64 {
        self.full_equivalent_tokens
            .saturating_sub(self.discovery_tokens)
    }

    /// Total tokens actually spent across all recorded retrievals.
    pub fn total_spent(&self) -> u64 {
        self.discovery_tokens + self.full_tokens
    }
}

/// Persists economics counters through the store's atomic sidecar path.
pub struct EconomicsTracker<'a> {
    store: &'a EntityStore,
}

impl<'a> EconomicsTracker<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Append one retrieval sample and return the updated counters.
    pub fn record(&self, namespace: &str, sample: RetrievalSample) -> Result<EconomicsCounters> {
        self.store
            .update_sidecar(namespace, ECONOMICS_FILE, ECONOMICS_LOCK, |counters: &mut EconomicsCounters| {
                counters.record(sample);
            })
    }

    /// Current counters for a namespace (zero if none recorded yet).
    pub fn read(&self, namespace: &str) -> Result<EconomicsCounters> {
        self.store.read_sidecar(namespace, ECONOMICS_FILE)
    }

    /// Explicit user-initiated reset. Never called by automatic
    /// processes.
    pub fn reset(&self, namespace: &str) -> Result<()> {
        self.store
            .update_sidecar(namespace, ECONOMICS_FILE, ECONOMICS_LOCK, |counters: &mut EconomicsCounters| {
                *counters = EconomicsCounters::default();
            })?;
        tracing::info!(namespace = %namespace, "Economics counters reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn make_store() -> (tempfile::TempDir, EntityStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        let store = EntityStore::open(&config).unwrap();
        (dir, store)
    }

    #[test]
    fn test_counters_accumulate() {
        let mut counters = EconomicsCounters::default();
        counters.record(RetrievalSample {
            discovery_tokens: 50,
            full_tokens: 200,
            full_equivalent_tokens: 900,
        });
        counters.record(RetrievalSample {
            discovery_tokens: 30,
            full_tokens: 100,
            full_equivalent_tokens: 400,
        });

        assert_eq!(counters.retrievals, 2);
        assert_eq!(counters.discovery_tokens, 80);
        assert_eq!(counters.full_tokens, 300);
        assert_eq!(counters.savings(), 1300 - 80);
        assert_eq!(counters.total_spent(), 380);
    }

    #[test]
    fn test_savings_never_underflows() {
        let mut counters = EconomicsCounters::default();
        counters.record(RetrievalSample {
            discovery_tokens: 100,
            full_tokens: 0,
            full_equivalent_tokens: 10,
        });
        assert_eq!(counters.savings(), 0);
    }

    #[test]
    fn test_tracker_persists_across_reads() {
        let (_dir, store) = make_store();
        let tracker = EconomicsTracker::new(&store);

        tracker
            .record(
                "proj1",
                RetrievalSample {
                    discovery_tokens: 10,
                    full_tokens: 40,
                    full_equivalent_tokens: 100,
                },
            )
            .unwrap();
        tracker
            .record(
                "proj1",
                RetrievalSample {
                    discovery_tokens: 5,
                    full_tokens: 0,
                    full_equivalent_tokens: 60,
                },
            )
            .unwrap();

        let counters = tracker.read("proj1").unwrap();
        assert_eq!(counters.retrievals, 2);
        assert_eq!(counters.discovery_tokens, 15);
        assert_eq!(counters.full_equivalent_tokens, 160);
    }

    #[test]
    fn test_namespaces_tracked_separately() {
        let (_dir, store) = make_store();
        let tracker = EconomicsTracker::new(&store);

        tracker
            .record("proj-a", RetrievalSample { discovery_tokens: 7, ..Default::default() })
            .unwrap();

        assert_eq!(tracker.read("proj-a").unwrap().retrievals, 1);
        assert_eq!(tracker.read("proj-b").unwrap().retrievals, 0);
    }

    #[test]
    fn test_explicit_reset() {
        let (_dir, store) = make_store();
        let tracker = EconomicsTracker::new(&store);

        tracker
            .record("proj1", RetrievalSample { discovery_tokens: 7, ..Default::default() })
            .unwrap();
        tracker.reset("proj1").unwrap();

        let counters = tracker.read("proj1").unwrap();
        assert_eq!(counters.retrievals, 0);
        assert_eq!(counters.discovery_tokens, 0);
    }
}
