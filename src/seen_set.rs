//! Seen Set & Baseline (§4.4). One `SeenSet` per marketplace, owned
//! exclusively by that marketplace's Poller; the Supervisor owns the shared
//! `BaselineFlag`.

use std::collections::{HashSet, VecDeque};

use tokio::sync::RwLock;

/// Per-marketplace set of already-seen `composite_id`s, bounded to the most
/// recent `capacity` entries. Trimming drops the oldest insertions first,
/// one per observation once the ledger exceeds `capacity` (§3).
pub struct SeenSet {
    capacity: usize,
    inner: RwLock<SeenSetInner>,
}

struct SeenSetInner {
    members: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(SeenSetInner {
                members: HashSet::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Returns `true` iff this is the first observation of `composite_id`;
    /// inserts unconditionally either way (§4.4).
    pub async fn observe(&self, composite_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let first_seen = inner.members.insert(composite_id.to_string());
        if first_seen {
            inner.order.push_back(composite_id.to_string());
            Self::trim(&mut inner, self.capacity);
        }
        first_seen
    }

    fn trim(inner: &mut SeenSetInner, capacity: usize) {
        while inner.order.len() > capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.members.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.members.len()
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.members.clear();
        inner.order.clear();
    }
}

/// Per-Supervisor flag: `false` until the first complete sweep across all
/// enabled marketplaces finishes, during which observations populate
/// `SeenSet` but never emit (§3, §4.4).
#[derive(Debug)]
pub struct BaselineFlag {
    done: std::sync::atomic::AtomicBool,
}

impl BaselineFlag {
    pub fn new() -> Self {
        Self {
            done: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn baseline_done(&self) -> bool {
        self.done.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn mark_baseline_done(&self) {
        self.done.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn reset(&self) {
        self.done.store(false, std::sync::atomic::Ordering::Release);
    }
}

impl Default for BaselineFlag {
    fn default() -> Self {
        Self::new()
    }
}
