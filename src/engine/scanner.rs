//! Realm filter and snipe scanner.
//!
//! The filter restricts incoming listings to the realms of interest
//! before any baseline update or scan — irrelevant realms must never
//! pollute price history, since cross-realm economies are not
//! comparable. The scanner then classifies each surviving listing
//! against the pre-update baseline and the resolved threshold.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::baseline::BaselineStore;
use crate::catalog::ItemCatalog;
use crate::rules::ThresholdResolver;
use crate::types::{AuctionListing, Copper, RealmId, SnipeCandidate};

/// Restrict listings to realms in the relevant set. Pure function —
/// filtering an already-filtered set is a no-op.
pub fn filter_relevant(
    listings: Vec<AuctionListing>,
    relevant: &HashSet<RealmId>,
) -> Vec<AuctionListing> {
    listings
        .into_iter()
        .filter(|l| relevant.contains(&l.realm_id))
        .collect()
}

/// Classify filtered listings against baselines and thresholds.
///
/// Per listing:
/// - skip if the unit price is undefined (bid-only or invalid quantity)
/// - skip if the unit price is under the junk floor
/// - skip if the item has no baseline yet (nothing to judge against)
/// - skip if the item's metadata is unknown (threshold needs class,
///   expansion and rarity; the catalog sync retries next run)
/// - skip if threshold resolution fails closed
/// - snipe iff ratio < threshold (strict — exactly at threshold is not
///   a snipe) and, for special-item rules with a ceiling, the unit
///   price is at or under the ceiling.
///
/// No deduplication here: multiple listings of the same item each
/// qualify independently.
pub fn scan(
    listings: &[AuctionListing],
    catalog: &ItemCatalog,
    baselines: &BaselineStore,
    resolver: &ThresholdResolver,
    min_unit_price: Copper,
) -> Vec<SnipeCandidate> {
    let mut candidates = Vec::new();

    for listing in listings {
        let Some(unit_price) = listing.unit_price() else {
            continue;
        };
        if unit_price < min_unit_price as f64 {
            continue;
        }
        let Some(baseline) = baselines.get(listing.item_id) else {
            continue;
        };
        let Some(item) = catalog.get(listing.item_id) else {
            debug!(item_id = listing.item_id, "No metadata yet, skipping listing");
            continue;
        };
        let Some(threshold) = resolver.resolve(item) else {
            continue; // fails closed: no rule, no default, never flagged
        };

        let ratio = unit_price / baseline.average_unit_price;
        if ratio >= threshold.ratio {
            continue;
        }
        if let Some(ceiling) = threshold.ceiling {
            if unit_price > ceiling as f64 {
                continue;
            }
        }

        debug!(
            auction_id = listing.auction_id,
            item_id = listing.item_id,
            realm = listing.realm_id,
            unit_price,
            baseline = baseline.average_unit_price,
            ratio,
            threshold = threshold.ratio,
            source = %threshold.source,
            "Snipe detected"
        );

        candidates.push(SnipeCandidate {
            listing: listing.clone(),
            item: item.clone(),
            baseline_avg: baseline.average_unit_price,
            threshold: threshold.ratio,
            ratio,
            source: threshold.source,
        });
    }

    info!(
        scanned = listings.len(),
        snipes = candidates.len(),
        "Scan complete"
    );
    candidates
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
