//! Detection engine: the per-run pipeline.
//!
//! fetch → realm filter → catalog sync → scan (pre-update baselines) →
//! fold baselines → format alerts. The caller hands the alerts to the
//! notification transport and commits the snapshot afterwards, so the
//! store commit stays the last state-changing side effect of a run.
//!
//! Scanning reads the pre-update baseline by design: this run's listings
//! are judged against history only, then folded in afterwards. A batch's
//! own cheap listing can never raise or lower the bar it is judged
//! against.

pub mod formatter;
pub mod scanner;

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::api::{self, AuctionSource};
use crate::baseline::BaselineStore;
use crate::catalog::ItemCatalog;
use crate::config::RuleSet;
use crate::rules::ThresholdResolver;
use crate::types::{Realm, RealmId, RunReport, SnipeAlert};

/// Everything a single run produced. Alerts are final — deduplicated,
/// enriched and ordered for the transport.
#[derive(Debug)]
pub struct CycleOutcome {
    pub alerts: Vec<SnipeAlert>,
    pub report: RunReport,
}

/// Run a single fetch→filter→scan→fold→format cycle.
///
/// Per-realm fetch failures are non-fatal: those realms are skipped and
/// their baselines simply not updated this tick. The baseline store is
/// mutated in memory only; persisting it is the caller's final step.
pub async fn run_cycle(
    source: &dyn AuctionSource,
    rules: &RuleSet,
    resolver: &ThresholdResolver,
    baselines: &mut BaselineStore,
    catalog: &mut ItemCatalog,
    concurrency: usize,
) -> Result<CycleOutcome> {
    let mut report = RunReport::default();

    // 1. Fetch snapshots for the realms of interest.
    let mut realm_ids: Vec<RealmId> = rules.relevant_realms.iter().copied().collect();
    realm_ids.sort_unstable();
    let fetch = api::fetch_realm_snapshots(source, &realm_ids, concurrency).await;
    report.realms_ok = fetch.realms_ok.len();
    report.realms_failed = fetch.realms_failed.len();
    report.listings_fetched = fetch.listings.len();

    // 2. Realm filter. The snapshots are already per-realm, but the
    //    relevance invariant is enforced here, not assumed of the source.
    let listings = scanner::filter_relevant(fetch.listings, &rules.relevant_realms);
    report.listings_relevant = listings.len();

    // 3. Metadata for newly encountered items.
    let item_ids: Vec<_> = listings.iter().map(|l| l.item_id).collect();
    report.items_discovered = catalog.sync_missing(source, &item_ids, concurrency).await;

    // 4. Scan against history only (pre-update baselines).
    let candidates = scanner::scan(&listings, catalog, baselines, resolver, rules.min_unit_price);
    report.snipes_found = candidates.len();

    // 5. Fold this run's listings into the baselines. Failed realms
    //    contributed no listings, so only successfully fetched data is
    //    incorporated.
    baselines.fold_listings(&listings, Utc::now());
    report.baseline_items = baselines.len();

    // 6. Enrich with realm display names (only for realms that alerted).
    let mut realm_names: HashMap<RealmId, Realm> = HashMap::new();
    let alert_realms: std::collections::HashSet<RealmId> =
        candidates.iter().map(|c| c.listing.realm_id).collect();
    for realm_id in alert_realms {
        match source.fetch_realm(realm_id).await {
            Ok(realm) => {
                realm_names.insert(realm_id, realm);
            }
            Err(e) => {
                warn!(realm = realm_id, error = %e, "Realm lookup failed, using numeric name");
            }
        }
    }

    // 7. Deduplicate and order for the transport.
    let alerts = formatter::format_alerts(candidates, &realm_names);
    report.alerts_emitted = alerts.len();

    info!(%report, source = source.name(), "Cycle pipeline complete");
    Ok(CycleOutcome { alerts, report })
}
