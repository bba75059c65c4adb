//! Frequently used stickers, ranked by use count then recency.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::KeyValueStorage;

pub const FREQUENTLY_USED_KEY: &str = "mauFrequentlyUsedStickerIDs";
pub const DEFAULT_TOP_LIMIT: usize = 16;

/// Stored as a `[count, lastUsedMs]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, i64)", into = "(u64, i64)")]
pub struct UsageRecord {
    pub count: u64,
    pub last_used_at_ms: i64,
}

impl From<(u64, i64)> for UsageRecord {
    fn from((count, last_used_at_ms): (u64, i64)) -> Self {
        Self {
            count,
            last_used_at_ms,
        }
    }
}

impl From<UsageRecord> for (u64, i64) {
    fn from(record: UsageRecord) -> Self {
        (record.count, record.last_used_at_ms)
    }
}

#[derive(Debug, Default)]
enum Ranking {
    #[default]
    Dirty,
    Ready(Vec<String>),
}

pub struct FrequencyStore {
    records: BTreeMap<String, UsageRecord>,
    ranking: RefCell<Ranking>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl FrequencyStore {
    pub fn load(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        let records = match storage.get(FREQUENTLY_USED_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeMap<String, UsageRecord>>(&raw) {
                Ok(records) => records,
                Err(error) => {
                    warn!("discarding unreadable frequently used stickers: {error}");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(error) => {
                warn!("failed to read frequently used stickers: {error:#}");
                BTreeMap::new()
            }
        };
        debug!(entries = records.len(), "loaded frequently used stickers");

        Self {
            records,
            ranking: RefCell::new(Ranking::Dirty),
            storage,
            clock,
        }
    }

    pub fn record_use(&mut self, id: &str) {
        let now = self.clock.now_ms();
        let record = self
            .records
            .entry(id.to_string())
            .or_insert(UsageRecord {
                count: 0,
                last_used_at_ms: now,
            });
        record.count += 1;
        record.last_used_at_ms = now;
        self.changed();
    }

    /// Up to `limit` ids, highest count first, most recent first on ties.
    pub fn top_used(&self, limit: usize) -> Vec<String> {
        self.ranked().iter().take(limit).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<UsageRecord> {
        self.records.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn remove(&mut self, id: &str) {
        if self.records.remove(id).is_some() {
            self.changed();
        }
    }

    pub fn remove_many<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = false;
        for id in ids {
            removed |= self.records.remove(id.as_ref()).is_some();
        }
        if removed {
            self.changed();
        }
    }

    pub fn remove_all(&mut self) {
        self.records.clear();
        self.changed();
    }

    /// Returns the surviving ids in ranked order.
    pub fn reconcile_with_catalog(&mut self, known_ids: &HashSet<String>) -> Vec<String> {
        let (kept, evicted): (Vec<String>, Vec<String>) = self
            .ranked()
            .iter()
            .cloned()
            .partition(|id| known_ids.contains(id));

        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                kept = kept.len(),
                "pruned frequently used stickers missing from catalog"
            );
            self.remove_many(&evicted);
        }
        kept
    }

    fn ranked(&self) -> Ref<'_, [String]> {
        if matches!(*self.ranking.borrow(), Ranking::Dirty) {
            self.ranking.replace(Ranking::Ready(self.rank()));
        }
        Ref::map(self.ranking.borrow(), |ranking| match ranking {
            Ranking::Ready(order) => order.as_slice(),
            Ranking::Dirty => &[],
        })
    }

    fn rank(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &UsageRecord)> = self.records.iter().collect();
        // BTreeMap iteration is id-ascending and the sort is stable, so exact
        // ties keep id order.
        entries.sort_by(|(_, a), (_, b)| {
            b.count
                .cmp(&a.count)
                .then(b.last_used_at_ms.cmp(&a.last_used_at_ms))
        });
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn changed(&mut self) {
        self.ranking.replace(Ranking::Dirty);
        self.persist();
    }

    fn persist(&self) {
        let payload = match serde_json::to_string(&self.records) {
            Ok(payload) => payload,
            Err(error) => {
                warn!("failed to encode frequently used stickers: {error}");
                return;
            }
        };
        if let Err(error) = self.storage.set(FREQUENTLY_USED_KEY, &payload) {
            warn!("failed to persist frequently used stickers: {error:#}");
        }
    }
}
