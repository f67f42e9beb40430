//! Cache of rendered substation summaries.
//!
//! Entries are namespaced per substation. Every write that touches a
//! substation must call [`SummaryCache::invalidate`] for it once committed;
//! [`crate::Ledger`] does so for all of its write operations.
//!
//! Each substation also carries a generation bumped by `invalidate`. A reader
//! takes the generation before querying and hands it back to `put`, so a
//! summary computed before a concurrent invalidation is never stored.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::{SubstationSummary, SummaryDates};

#[derive(Debug, Default)]
struct Entries {
    summaries: HashMap<i64, HashMap<SummaryDates, SubstationSummary>>,
    generations: HashMap<i64, u64>,
}

#[derive(Debug, Default)]
pub struct SummaryCache {
    entries: RwLock<Entries>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, substation_id: i64, dates: &SummaryDates) -> Option<SubstationSummary> {
        let entries = self.entries.read().await;
        entries
            .summaries
            .get(&substation_id)
            .and_then(|by_dates| by_dates.get(dates))
            .cloned()
    }

    /// Current generation of a substation; pass it to [`SummaryCache::put`].
    pub async fn generation(&self, substation_id: i64) -> u64 {
        let entries = self.entries.read().await;
        entries.generations.get(&substation_id).copied().unwrap_or(0)
    }

    /// Store `summary` unless its substation was invalidated after
    /// `generation` was read. Returns whether it was stored.
    pub async fn put(&self, summary: SubstationSummary, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        let id = summary.substation.id;
        if entries.generations.get(&id).copied().unwrap_or(0) != generation {
            tracing::debug!(substation_id = id, "discarding summary computed before invalidation");
            return false;
        }
        entries.summaries.entry(id).or_default().insert(summary.dates, summary);
        true
    }

    pub async fn invalidate(&self, substation_id: i64) {
        let mut entries = self.entries.write().await;
        *entries.generations.entry(substation_id).or_insert(0) += 1;
        if let Some(by_dates) = entries.summaries.remove(&substation_id) {
            tracing::debug!(substation_id, dropped = by_dates.len(), "summary cache invalidated");
        }
    }

    /// Drop every cached summary. Generations are kept so in-flight readers
    /// still cannot store what they computed before a write.
    pub async fn clear(&self) {
        self.entries.write().await.summaries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.summaries.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GroupSnapshot, Substation, TechnicalMeterStats};
    use time::macros::date;

    fn summary(id: i64, dates: SummaryDates) -> SubstationSummary {
        SubstationSummary {
            substation: Substation {
                id,
                name: format!("Sub-{id}"),
            },
            dates,
            residential: GroupSnapshot::default(),
            legal_entity_a: GroupSnapshot::default(),
            legal_entity_b: GroupSnapshot::default(),
            general_metering_a: GroupSnapshot::default(),
            general_metering_b: GroupSnapshot::default(),
            technical: TechnicalMeterStats::default(),
        }
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_one_substation() {
        let cache = SummaryCache::new();
        let june = SummaryDates::all_at(date!(2023 - 06 - 01));
        let july = SummaryDates::all_at(date!(2023 - 07 - 01));

        assert!(cache.put(summary(1, june), 0).await);
        assert!(cache.put(summary(1, july), 0).await);
        assert!(cache.put(summary(2, june), 0).await);
        assert_eq!(cache.len().await, 3);

        cache.invalidate(1).await;
        assert!(cache.get(1, &june).await.is_none());
        assert!(cache.get(1, &july).await.is_none());
        assert_eq!(cache.get(2, &june).await, Some(summary(2, june)));

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn summary_read_before_invalidation_is_not_stored() {
        let cache = SummaryCache::new();
        let june = SummaryDates::all_at(date!(2023 - 06 - 01));

        // Reader takes the generation, then a write commits before it stores.
        let seen = cache.generation(1).await;
        cache.invalidate(1).await;
        assert!(!cache.put(summary(1, june), seen).await);
        assert!(cache.get(1, &june).await.is_none());

        // Other substations are unaffected by that invalidation.
        assert!(cache.put(summary(2, june), cache.generation(2).await).await);

        let fresh = cache.generation(1).await;
        assert_eq!(fresh, seen + 1);
        assert!(cache.put(summary(1, june), fresh).await);
        assert_eq!(cache.get(1, &june).await, Some(summary(1, june)));
    }
}
