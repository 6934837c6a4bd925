//! Marketplace API integrations.
//!
//! Defines the `AuctionSource` trait and the concrete Blizzard client.
//! The engine only ever sees the trait, so tests drive full cycles with
//! an in-memory source.

pub mod blizzard;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::types::{AuctionListing, Item, ItemId, Realm, RealmId};

/// Abstraction over the marketplace API.
///
/// Implementors provide per-realm auction snapshots, item metadata and
/// realm lookup. Auth, pagination and rate limits are internal to the
/// implementor.
#[async_trait]
pub trait AuctionSource: Send + Sync {
    /// Fetch the current auction snapshot for one connected realm.
    async fn fetch_auctions(&self, realm: RealmId) -> Result<Vec<AuctionListing>>;

    /// Fetch reference metadata for one item.
    async fn fetch_item(&self, item: ItemId) -> Result<Item>;

    /// Fetch display information for one connected realm.
    async fn fetch_realm(&self, realm: RealmId) -> Result<Realm>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}

/// Result of fanning out across realms: whatever arrived, plus the
/// realms that failed after retries and are skipped for this run.
#[derive(Debug, Default)]
pub struct RealmFetch {
    pub listings: Vec<AuctionListing>,
    pub realms_ok: Vec<RealmId>,
    pub realms_failed: Vec<RealmId>,
}

/// Fetch auction snapshots for all given realms with a fixed concurrency
/// cap. A realm-level failure is logged and that realm is skipped for
/// this run only — it must not abort the other realms' processing.
pub async fn fetch_realm_snapshots(
    source: &dyn AuctionSource,
    realms: &[RealmId],
    concurrency: usize,
) -> RealmFetch {
    let results: Vec<(RealmId, Result<Vec<AuctionListing>>)> = stream::iter(realms.iter().copied())
        .map(|realm| async move { (realm, source.fetch_auctions(realm).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut fetch = RealmFetch::default();
    for (realm, result) in results {
        match result {
            Ok(listings) => {
                info!(realm, count = listings.len(), "Realm snapshot fetched");
                fetch.listings.extend(listings);
                fetch.realms_ok.push(realm);
            }
            Err(e) => {
                warn!(realm, error = %e, "Realm fetch failed, skipping this run");
                fetch.realms_failed.push(realm);
            }
        }
    }
    fetch
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
