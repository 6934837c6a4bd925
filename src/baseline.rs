//! Historical price baseline store.
//!
//! Durable mapping from item id to rolling price statistics, keyed per
//! item across all relevant realms. Updates are a count-weighted
//! incorporation of a run's observed unit prices into the existing
//! running average, so a run contributing many listings carries
//! proportionally more weight than a run contributing one. The sample
//! count accumulates monotonically: the baseline is a lifetime rolling
//! average, not a sliding window. Entries are never deleted — items that
//! stop being observed simply age out of relevance.
//!
//! No outlier rejection is performed before folding. A single extreme
//! listing shifts the average it is later used to judge other listings
//! against; `test_single_outlier_drags_average` pins this behaviour so a
//! future change is deliberate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::types::{AuctionListing, ItemId, PriceBaseline};

/// In-memory baseline store, serialized exactly as the snapshot schema
/// (item id -> { averageUnitPrice, sampleCount, lastUpdated }).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineStore {
    entries: BTreeMap<ItemId, PriceBaseline>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup. Absent means "no baseline": the item has never been
    /// observed and can never produce a snipe.
    pub fn get(&self, item_id: ItemId) -> Option<&PriceBaseline> {
        self.entries.get(&item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold one item's observed unit prices into its baseline.
    ///
    /// new_avg = (old_avg * old_count + sum(observed)) / (old_count + n).
    /// An empty observation slice is a no-op.
    pub fn fold(&mut self, item_id: ItemId, observed: &[f64], now: DateTime<Utc>) {
        if observed.is_empty() {
            return;
        }

        let sum: f64 = observed.iter().sum();
        let n = observed.len() as u64;

        match self.entries.get_mut(&item_id) {
            Some(entry) => {
                let total = entry.average_unit_price * entry.sample_count as f64 + sum;
                entry.sample_count += n;
                entry.average_unit_price = total / entry.sample_count as f64;
                entry.last_updated = now;
            }
            None => {
                self.entries.insert(
                    item_id,
                    PriceBaseline {
                        average_unit_price: sum / n as f64,
                        sample_count: n,
                        last_updated: now,
                    },
                );
            }
        }
    }

    /// Fold a batch of listings, grouping unit prices by item first so
    /// the result is independent of listing order within the batch.
    /// Bid-only and invalid-quantity listings contribute nothing.
    pub fn fold_listings(&mut self, listings: &[AuctionListing], now: DateTime<Utc>) {
        let mut by_item: HashMap<ItemId, Vec<f64>> = HashMap::new();
        for listing in listings {
            if let Some(price) = listing.unit_price() {
                by_item.entry(listing.item_id).or_default().push(price);
            }
        }
        for (item_id, prices) in by_item {
            self.fold(item_id, &prices, now);
        }
    }

    /// Seed an entry directly (tests and migration tooling).
    pub fn insert(&mut self, item_id: ItemId, baseline: PriceBaseline) {
        self.entries.insert(item_id, baseline);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn baseline(avg: f64, count: u64) -> PriceBaseline {
        PriceBaseline {
            average_unit_price: avg,
            sample_count: count,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_get_absent_is_none() {
        let store = BaselineStore::new();
        assert!(store.get(12345).is_none());
    }

    #[test]
    fn test_first_fold_creates_entry() {
        let mut store = BaselineStore::new();
        store.fold(100, &[1000.0, 2000.0], Utc::now());
        let entry = store.get(100).unwrap();
        assert!((entry.average_unit_price - 1500.0).abs() < EPS);
        assert_eq!(entry.sample_count, 2);
    }

    #[test]
    fn test_weighted_incorporation() {
        let mut store = BaselineStore::new();
        store.insert(100, baseline(1000.0, 10));

        // 10 samples at 1000 + 2 samples at 400 -> (10000 + 800) / 12
        store.fold(100, &[300.0, 500.0], Utc::now());
        let entry = store.get(100).unwrap();
        assert!((entry.average_unit_price - 10_800.0 / 12.0).abs() < EPS);
        assert_eq!(entry.sample_count, 12);
    }

    #[test]
    fn test_empty_fold_is_noop() {
        let mut store = BaselineStore::new();
        store.insert(100, baseline(1000.0, 10));
        let before = store.get(100).cloned().unwrap();
        store.fold(100, &[], Utc::now());
        assert_eq!(store.get(100), Some(&before));
    }

    #[test]
    fn test_sample_count_monotone() {
        let mut store = BaselineStore::new();
        for _ in 0..5 {
            store.fold(100, &[500.0], Utc::now());
        }
        assert_eq!(store.get(100).unwrap().sample_count, 5);
    }

    #[test]
    fn test_batch_fold_order_independent() {
        let now = Utc::now();
        let prices = [100.0, 900.0, 500.0];

        let mut a = BaselineStore::new();
        a.fold(100, &prices, now);

        let mut b = BaselineStore::new();
        b.fold(100, &[500.0, 100.0, 900.0], now);

        // One-at-a-time folding in a third order.
        let mut c = BaselineStore::new();
        c.fold(100, &[900.0], now);
        c.fold(100, &[100.0], now);
        c.fold(100, &[500.0], now);

        let (ea, eb, ec) = (a.get(100).unwrap(), b.get(100).unwrap(), c.get(100).unwrap());
        assert!((ea.average_unit_price - eb.average_unit_price).abs() < EPS);
        assert!((ea.average_unit_price - ec.average_unit_price).abs() < 1e-6);
        assert_eq!(ea.sample_count, 3);
        assert_eq!(ec.sample_count, 3);
    }

    #[test]
    fn test_fold_listings_groups_by_item() {
        let mut store = BaselineStore::new();
        let listings = vec![
            AuctionListing::sample(1, 100, 1080, 1_000),
            AuctionListing::sample(2, 100, 1080, 3_000),
            AuctionListing::sample(3, 200, 1080, 500),
        ];
        store.fold_listings(&listings, Utc::now());

        assert!((store.get(100).unwrap().average_unit_price - 2_000.0).abs() < EPS);
        assert_eq!(store.get(100).unwrap().sample_count, 2);
        assert!((store.get(200).unwrap().average_unit_price - 500.0).abs() < EPS);
    }

    #[test]
    fn test_fold_listings_skips_bid_only_and_invalid() {
        let mut store = BaselineStore::new();
        let mut invalid = AuctionListing::sample(2, 100, 1080, 5_000);
        invalid.quantity = 0;
        let listings = vec![AuctionListing::sample(1, 100, 1080, 0), invalid];
        store.fold_listings(&listings, Utc::now());
        assert!(store.get(100).is_none());
    }

    #[test]
    fn test_fold_listings_uses_unit_price() {
        let mut store = BaselineStore::new();
        let mut stack = AuctionListing::sample(1, 100, 1080, 20_000);
        stack.quantity = 20;
        store.fold_listings(&[stack], Utc::now());
        assert!((store.get(100).unwrap().average_unit_price - 1_000.0).abs() < EPS);
    }

    // Deliberate (unmitigated) behaviour: one mispriced listing pollutes
    // the baseline used to judge later listings.
    #[test]
    fn test_single_outlier_drags_average() {
        let mut store = BaselineStore::new();
        store.insert(100, baseline(1_000.0, 4));
        store.fold(100, &[1.0], Utc::now());
        let entry = store.get(100).unwrap();
        assert!(entry.average_unit_price < 850.0);
        assert_eq!(entry.sample_count, 5);
    }

    #[test]
    fn test_snapshot_shape_round_trip() {
        let mut store = BaselineStore::new();
        store.insert(100, baseline(1234.5, 42));
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.contains("\"100\""));
        let restored: BaselineStore = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get(100), store.get(100));
    }
}
