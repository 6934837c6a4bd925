//! Item reference-data catalog.
//!
//! Persisted item-id -> metadata map (name, class, quality, expansion,
//! icon). The engine only reads it; the sync step fetches metadata for
//! ids encountered in listings but not yet known, so the catalog grows
//! lazily and a fetch failure simply defers the item to a later run.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::api::AuctionSource;
use crate::types::{Item, ItemId};

/// Local item metadata catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemCatalog {
    items: BTreeMap<ItemId, Item>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids from `wanted` that the catalog does not know yet.
    pub fn missing_from<I>(&self, wanted: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = ItemId>,
    {
        let unique: HashSet<ItemId> = wanted.into_iter().collect();
        let mut missing: Vec<ItemId> = unique
            .into_iter()
            .filter(|id| !self.items.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing
    }

    /// Fetch metadata for unknown ids with a bounded fan-out.
    ///
    /// Per-item fetch failures are logged and skipped; the ids stay
    /// missing and are retried on the next run. Returns the number of
    /// items added.
    pub async fn sync_missing(
        &mut self,
        source: &dyn AuctionSource,
        wanted: &[ItemId],
        concurrency: usize,
    ) -> usize {
        let missing = self.missing_from(wanted.iter().copied());
        if missing.is_empty() {
            return 0;
        }
        debug!(count = missing.len(), "Fetching metadata for new items");

        let fetched: Vec<Option<Item>> = stream::iter(missing)
            .map(|id| async move {
                match source.fetch_item(id).await {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(item_id = id, error = %e, "Item metadata fetch failed, deferring");
                        None
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut added = 0;
        for item in fetched.into_iter().flatten() {
            self.insert(item);
            added += 1;
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
