//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API credentials, webhook URL) are referenced by env-var name
//! in the config and resolved at runtime via `std::env::var`.
//!
//! The threshold and realm rule documents are separate JSON files
//! (`expansion_presets.json`, `special_items.json`,
//! `relevant_realms.json`) loaded into a validated [`RuleSet`]. All
//! validation happens at load time, before any network or baseline work:
//! a malformed or ambiguous rule set aborts the run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;

use crate::types::{Copper, ItemId, RealmId, SnipeError};

// ---------------------------------------------------------------------------
// Application config (config.toml)
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub api: ApiConfig,
    pub rules: RulesConfig,
    pub storage: StorageConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    /// Run a single cycle and exit (external scheduler cadence).
    #[serde(default)]
    pub run_once: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Region slug for API hosts, e.g. "eu", "us".
    pub region: String,
    pub locale: String,
    pub client_id_env: String,
    pub client_secret_env: String,
    /// Fixed cap on concurrent realm/item fetches.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_max_concurrent_fetches() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RulesConfig {
    pub expansion_presets_path: String,
    pub special_items_path: String,
    pub relevant_realms_path: String,
    /// Global default threshold ratio. Absent means resolution fails
    /// closed for items no tier-1/2 rule matches.
    #[serde(default)]
    pub default_ratio: Option<f64>,
    /// Minimum unit price for a listing to be alert-worthy (copper).
    /// Suppresses junk listings that are technically far below baseline.
    #[serde(default = "default_min_unit_price")]
    pub min_unit_price: Copper,
}

fn default_min_unit_price() -> Copper {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub baseline_path: String,
    pub catalog_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default)]
    pub discord_webhook_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

// ---------------------------------------------------------------------------
// Rule documents (JSON)
// ---------------------------------------------------------------------------

/// One class/expansion preset entry. A rarity-qualified entry is strictly
/// more specific than a class-only one and wins within the same expansion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRule {
    pub item_class: String,
    #[serde(default)]
    pub rarity: Option<u8>,
    pub threshold_ratio: f64,
}

/// Per-item override. Takes precedence over every preset rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialRule {
    pub threshold_ratio: f64,
    /// Hard price cap in copper, independent of the baseline.
    #[serde(default)]
    pub absolute_max_price: Option<Copper>,
}

/// Validated threshold and realm configuration.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// expansion id -> preset rules for that expansion.
    pub presets: HashMap<u32, Vec<PresetRule>>,
    /// item id -> special-item rule.
    pub special: HashMap<ItemId, SpecialRule>,
    /// Realms of interest; all other realms are ignored entirely.
    pub relevant_realms: HashSet<RealmId>,
    pub default_ratio: Option<f64>,
    pub min_unit_price: Copper,
}

impl RuleSet {
    /// Build a rule set from already-parsed parts, rejecting invalid or
    /// ambiguous rules. Also the constructor used by tests.
    pub fn new(
        presets: HashMap<u32, Vec<PresetRule>>,
        special: HashMap<ItemId, SpecialRule>,
        relevant_realms: HashSet<RealmId>,
        default_ratio: Option<f64>,
        min_unit_price: Copper,
    ) -> Result<Self> {
        let set = Self {
            presets,
            special,
            relevant_realms,
            default_ratio,
            min_unit_price,
        };
        set.validate()?;
        Ok(set)
    }

    /// Load and validate the three rule documents.
    pub fn load(cfg: &RulesConfig) -> Result<Self> {
        let presets_raw: HashMap<String, Vec<PresetRule>> =
            read_json(&cfg.expansion_presets_path)?;
        let special_raw: HashMap<String, SpecialRule> = read_json(&cfg.special_items_path)?;
        let realms: Vec<RealmId> = read_json(&cfg.relevant_realms_path)?;

        let presets = presets_raw
            .into_iter()
            .map(|(k, v)| {
                let id = k.parse::<u32>().map_err(|_| {
                    SnipeError::Config(format!("Invalid expansion id key: {k:?}"))
                })?;
                Ok((id, v))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let special = special_raw
            .into_iter()
            .map(|(k, v)| {
                let id = k
                    .parse::<ItemId>()
                    .map_err(|_| SnipeError::Config(format!("Invalid item id key: {k:?}")))?;
                Ok((id, v))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Self::new(
            presets,
            special,
            realms.into_iter().collect(),
            cfg.default_ratio,
            cfg.min_unit_price,
        )
    }

    /// Reject out-of-range ratios and duplicate preset keys.
    ///
    /// Two rarity-specific rules for the same (expansion, class, rarity)
    /// tuple would make resolution order-dependent, so they are a
    /// configuration error, not a runtime tiebreak.
    fn validate(&self) -> Result<()> {
        for (expansion, rules) in &self.presets {
            let mut seen: HashSet<(String, Option<u8>)> = HashSet::new();
            for rule in rules {
                check_ratio(rule.threshold_ratio, &format!("expansion {expansion} preset"))?;
                let key = (rule.item_class.to_lowercase(), rule.rarity);
                if !seen.insert(key) {
                    return Err(SnipeError::Config(format!(
                        "Duplicate preset rule for expansion {expansion}, class {:?}, rarity {:?}",
                        rule.item_class, rule.rarity
                    ))
                    .into());
                }
            }
        }

        for (item_id, rule) in &self.special {
            check_ratio(rule.threshold_ratio, &format!("special item {item_id}"))?;
        }

        if let Some(ratio) = self.default_ratio {
            check_ratio(ratio, "global default")?;
        }

        Ok(())
    }
}

fn check_ratio(ratio: f64, what: &str) -> Result<()> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(SnipeError::Config(format!(
            "Threshold ratio for {what} must be in (0, 1], got {ratio}"
        ))
        .into());
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| SnipeError::Config(format!("Failed to read rule file {path}: {e}")))?;
    serde_json::from_str(&contents)
        .map_err(|e| SnipeError::Config(format!("Failed to parse rule file {path}: {e}")).into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(class: &str, rarity: Option<u8>, ratio: f64) -> PresetRule {
        PresetRule {
            item_class: class.to_string(),
            rarity,
            threshold_ratio: ratio,
        }
    }

    #[test]
    fn test_valid_rule_set() {
        let mut presets = HashMap::new();
        presets.insert(
            9,
            vec![preset("Weapon", None, 0.3), preset("Weapon", Some(4), 0.5)],
        );
        let set = RuleSet::new(presets, HashMap::new(), HashSet::new(), Some(0.2), 10_000);
        assert!(set.is_ok());
    }

    #[test]
    fn test_duplicate_preset_rejected() {
        let mut presets = HashMap::new();
        presets.insert(
            9,
            vec![preset("Weapon", Some(4), 0.3), preset("weapon", Some(4), 0.5)],
        );
        let err = RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).unwrap_err();
        assert!(err.to_string().contains("Duplicate preset rule"));
    }

    #[test]
    fn test_duplicate_class_only_rejected() {
        let mut presets = HashMap::new();
        presets.insert(2, vec![preset("Armor", None, 0.3), preset("Armor", None, 0.4)]);
        assert!(RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).is_err());
    }

    #[test]
    fn test_same_class_different_rarity_ok() {
        let mut presets = HashMap::new();
        presets.insert(
            2,
            vec![preset("Armor", Some(3), 0.3), preset("Armor", Some(4), 0.4)],
        );
        assert!(RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).is_ok());
    }

    #[test]
    fn test_ratio_out_of_range_rejected() {
        let mut presets = HashMap::new();
        presets.insert(9, vec![preset("Weapon", None, 1.5)]);
        assert!(RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).is_err());

        let mut presets = HashMap::new();
        presets.insert(9, vec![preset("Weapon", None, 0.0)]);
        assert!(RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).is_err());
    }

    #[test]
    fn test_ratio_of_one_allowed() {
        // Ratio 1 means "any price at or under baseline counts".
        let mut presets = HashMap::new();
        presets.insert(9, vec![preset("Weapon", None, 1.0)]);
        assert!(RuleSet::new(presets, HashMap::new(), HashSet::new(), None, 0).is_ok());
    }

    #[test]
    fn test_bad_default_ratio_rejected() {
        let set = RuleSet::new(HashMap::new(), HashMap::new(), HashSet::new(), Some(-0.1), 0);
        assert!(set.is_err());
    }

    #[test]
    fn test_bad_special_ratio_rejected() {
        let mut special = HashMap::new();
        special.insert(
            200,
            SpecialRule {
                threshold_ratio: 2.0,
                absolute_max_price: None,
            },
        );
        assert!(RuleSet::new(HashMap::new(), special, HashSet::new(), None, 0).is_err());
    }

    // -- JSON document shapes --

    #[test]
    fn test_preset_document_shape() {
        let json = r#"{"9": [{"itemClass": "Weapon", "rarity": 4, "thresholdRatio": 0.3},
                             {"itemClass": "Armor", "thresholdRatio": 0.25}]}"#;
        let parsed: HashMap<String, Vec<PresetRule>> = serde_json::from_str(json).unwrap();
        let rules = &parsed["9"];
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rarity, Some(4));
        assert_eq!(rules[1].rarity, None);
        assert_eq!(rules[1].threshold_ratio, 0.25);
    }

    #[test]
    fn test_special_document_shape() {
        let json = r#"{"19019": {"thresholdRatio": 0.5, "absoluteMaxPrice": 500000}}"#;
        let parsed: HashMap<String, SpecialRule> = serde_json::from_str(json).unwrap();
        let rule = &parsed["19019"];
        assert_eq!(rule.threshold_ratio, 0.5);
        assert_eq!(rule.absolute_max_price, Some(500_000));
    }

    #[test]
    fn test_load_from_files() {
        let dir = std::env::temp_dir().join(format!("snipewatch_rules_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let presets_path = dir.join("presets.json");
        let special_path = dir.join("special.json");
        let realms_path = dir.join("realms.json");
        std::fs::write(
            &presets_path,
            r#"{"9": [{"itemClass": "Weapon", "thresholdRatio": 0.3}]}"#,
        )
        .unwrap();
        std::fs::write(&special_path, r#"{"200": {"thresholdRatio": 0.5}}"#).unwrap();
        std::fs::write(&realms_path, r#"[1080, 1305]"#).unwrap();

        let cfg = RulesConfig {
            expansion_presets_path: presets_path.to_string_lossy().into_owned(),
            special_items_path: special_path.to_string_lossy().into_owned(),
            relevant_realms_path: realms_path.to_string_lossy().into_owned(),
            default_ratio: Some(0.2),
            min_unit_price: 10_000,
        };

        let set = RuleSet::load(&cfg).unwrap();
        assert_eq!(set.presets[&9].len(), 1);
        assert!(set.special.contains_key(&200));
        assert!(set.relevant_realms.contains(&1080));
        assert!(set.relevant_realms.contains(&1305));
        assert_eq!(set.default_ratio, Some(0.2));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let cfg = RulesConfig {
            expansion_presets_path: "/tmp/snipewatch_does_not_exist.json".into(),
            special_items_path: "/tmp/snipewatch_does_not_exist.json".into(),
            relevant_realms_path: "/tmp/snipewatch_does_not_exist.json".into(),
            default_ratio: None,
            min_unit_price: 0,
        };
        let err = RuleSet::load(&cfg).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_app_config_parses() {
        let toml_str = r#"
            [agent]
            name = "SNIPEWATCH-001"
            scan_interval_secs = 1200

            [api]
            region = "eu"
            locale = "en_US"
            client_id_env = "BLIZZARD_CLIENT_ID"
            client_secret_env = "BLIZZARD_CLIENT_SECRET"

            [rules]
            expansion_presets_path = "config/expansion_presets.json"
            special_items_path = "config/special_items.json"
            relevant_realms_path = "config/relevant_realms.json"
            default_ratio = 0.2

            [storage]
            baseline_path = "data/baselines.json"
            catalog_path = "data/items.json"

            [alerts]
            discord_webhook_env = "DISCORD_WEBHOOK_URL"
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.agent.name, "SNIPEWATCH-001");
        assert!(!cfg.agent.run_once);
        assert_eq!(cfg.api.max_concurrent_fetches, 4);
        assert_eq!(cfg.rules.min_unit_price, 10_000);
        assert_eq!(cfg.rules.default_ratio, Some(0.2));
        assert_eq!(cfg.alerts.discord_webhook_env.as_deref(), Some("DISCORD_WEBHOOK_URL"));
    }
}
