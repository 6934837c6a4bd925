//! SNIPEWATCH — Auction House Snipe Detection Agent
//!
//! Entry point. Loads configuration and threshold rules, initialises
//! structured logging, restores the baseline snapshot from disk (or
//! starts fresh), and runs the fetch→scan→alert loop with graceful
//! shutdown. The snapshot commit is the last step of every run.

use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::{error, info, warn};

use snipewatch::api::blizzard::BlizzardClient;
use snipewatch::baseline::BaselineStore;
use snipewatch::config::{AppConfig, RuleSet};
use snipewatch::engine;
use snipewatch::notify::DiscordNotifier;
use snipewatch::rules::ThresholdResolver;
use snipewatch::storage;
use snipewatch::types::RunReport;

const BANNER: &str = r#"
 ____  _   _ ___ ____  _______        ___  _____ ____ _   _
/ ___|| \ | |_ _|  _ \| ____\ \      / / \|_   _/ ___| | | |
\___ \|  \| || || |_) |  _|  \ \ /\ / / _ \ | || |   | |_| |
 ___) | |\  || ||  __/| |___  \ V  V / ___ \| || |___|  _  |
|____/|_| \_|___|_|   |_____|  \_/\_/_/   \_\_| \____|_| |_|

  Auction House Snipe Detection Agent
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        region = %cfg.api.region,
        scan_interval_secs = cfg.agent.scan_interval_secs,
        run_once = cfg.agent.run_once,
        "SNIPEWATCH starting up"
    );

    // -- Rules first: a bad rule set aborts before any network work ------

    let rules = RuleSet::load(&cfg.rules)?;
    let resolver = ThresholdResolver::from_rules(&rules);
    info!(
        realms = rules.relevant_realms.len(),
        expansions = rules.presets.len(),
        special_items = rules.special.len(),
        default_ratio = ?rules.default_ratio,
        "Threshold rules loaded"
    );

    // -- Restore or create state -----------------------------------------

    let mut baselines = match storage::load_baselines(&cfg.storage.baseline_path)? {
        Some(store) => store,
        None => BaselineStore::new(),
    };
    let mut catalog = storage::load_catalog(&cfg.storage.catalog_path);

    // -- Initialise clients ----------------------------------------------

    let client_id = AppConfig::resolve_env(&cfg.api.client_id_env)?;
    let client_secret = SecretString::new(AppConfig::resolve_env(&cfg.api.client_secret_env)?);
    let source = BlizzardClient::new(&cfg.api.region, &cfg.api.locale, client_id, client_secret)?;

    let notifier = match cfg.alerts.discord_webhook_env.as_deref() {
        Some(env_name) => match std::env::var(env_name) {
            Ok(url) => Some(DiscordNotifier::new(url)?),
            Err(_) => {
                warn!(env = env_name, "Webhook env var not set — alerts will be logged only");
                None
            }
        },
        None => None,
    };

    // -- Run -------------------------------------------------------------

    if cfg.agent.run_once {
        let report = run_and_commit(
            &cfg,
            &source,
            &rules,
            &resolver,
            &mut baselines,
            &mut catalog,
            notifier.as_ref(),
        )
        .await?;
        log_run_report(&report);
        info!("Single run complete, exiting.");
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_and_commit(
                    &cfg, &source, &rules, &resolver,
                    &mut baselines, &mut catalog, notifier.as_ref(),
                ).await {
                    Ok(report) => log_run_report(&report),
                    Err(e) => error!(error = %e, "Run failed — continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(baseline_items = baselines.len(), "SNIPEWATCH shut down cleanly.");
    Ok(())
}

/// One full run: cycle, notify, then commit the snapshot last.
///
/// Notification failure is logged and does not block the commit; a
/// failed commit is fatal because the run's observations would be lost.
async fn run_and_commit(
    cfg: &AppConfig,
    source: &BlizzardClient,
    rules: &RuleSet,
    resolver: &ThresholdResolver,
    baselines: &mut BaselineStore,
    catalog: &mut snipewatch::catalog::ItemCatalog,
    notifier: Option<&DiscordNotifier>,
) -> Result<RunReport> {
    let outcome = engine::run_cycle(
        source,
        rules,
        resolver,
        baselines,
        catalog,
        cfg.api.max_concurrent_fetches,
    )
    .await?;

    if !outcome.alerts.is_empty() {
        for alert in &outcome.alerts {
            info!(%alert, "Snipe");
        }
        if let Some(notifier) = notifier {
            if let Err(e) = notifier.send(&outcome.alerts).await {
                error!(error = %e, "Alert delivery failed");
            }
        }
    }

    // Snapshot commit is the final side effect of the run.
    storage::save_baselines(baselines, &cfg.storage.baseline_path)?;
    storage::save_catalog(catalog, &cfg.storage.catalog_path)?;

    Ok(outcome.report)
}

/// Log a human-readable run summary.
fn log_run_report(report: &RunReport) {
    info!(
        realms_ok = report.realms_ok,
        realms_failed = report.realms_failed,
        listings = report.listings_fetched,
        relevant = report.listings_relevant,
        new_items = report.items_discovered,
        snipes = report.snipes_found,
        alerts = report.alerts_emitted,
        baselines = report.baseline_items,
        "Run complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("snipewatch=info"));

    let json_logging = std::env::var("SNIPEWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
