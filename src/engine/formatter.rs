//! Candidate formatting and deduplication.
//!
//! Turns raw scanner output into the ordered alert list handed to the
//! notification transport. A listing observed identically across retried
//! fetches within one run must not produce two notifications, so
//! candidates collapse on (realm id, auction id). There is no cross-run
//! deduplication — a still-live auction alerts again next run.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::{Realm, RealmId, SnipeAlert, SnipeCandidate};

/// Deduplicate, enrich and order snipe candidates.
///
/// Alerts are sorted by ratio ascending — deepest discounts first —
/// with auction id as a stable tiebreak. Realms missing from the lookup
/// fall back to a numeric display name.
pub fn format_alerts(
    candidates: Vec<SnipeCandidate>,
    realms: &HashMap<RealmId, Realm>,
) -> Vec<SnipeAlert> {
    let total = candidates.len();
    let mut seen: HashSet<(RealmId, u64)> = HashSet::new();
    let mut alerts = Vec::new();

    for candidate in candidates {
        if !seen.insert((candidate.listing.realm_id, candidate.listing.auction_id)) {
            continue;
        }

        let realm_name = realms
            .get(&candidate.listing.realm_id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("Realm {}", candidate.listing.realm_id));

        // unit_price is defined here: the scanner never emits a
        // candidate for a bid-only or invalid-quantity listing.
        let unit_price = candidate.listing.unit_price().unwrap_or_default();

        alerts.push(SnipeAlert {
            auction_id: candidate.listing.auction_id,
            realm_id: candidate.listing.realm_id,
            realm_name,
            item_id: candidate.item.id,
            item_name: candidate.item.name,
            icon_url: candidate.item.icon_url,
            quantity: candidate.listing.quantity,
            unit_price,
            baseline_avg: candidate.baseline_avg,
            threshold: candidate.threshold,
            ratio: candidate.ratio,
        });
    }

    alerts.sort_by(|a, b| {
        a.ratio
            .partial_cmp(&b.ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.auction_id.cmp(&b.auction_id))
    });

    if alerts.len() < total {
        debug!(
            duplicates = total - alerts.len(),
            "Collapsed duplicate candidates"
        );
    }
    alerts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
