//! Shared types for the SNIPEWATCH agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that api, rules, engine and
//! storage modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item identity as issued by the marketplace.
pub type ItemId = u32;

/// Connected-realm identity.
pub type RealmId = u32;

/// Absolute currency unit (copper; 10,000 copper = 1 gold).
pub type Copper = u64;

/// Render a copper amount as "Xg Ys Zc" for human-readable output.
pub fn format_gold(copper: f64) -> String {
    let total = copper.round().max(0.0) as u64;
    let gold = total / 10_000;
    let silver = (total % 10_000) / 100;
    let copper = total % 100;
    if gold > 0 {
        format!("{gold}g {silver:02}s {copper:02}c")
    } else if silver > 0 {
        format!("{silver}s {copper:02}c")
    } else {
        format!("{copper}c")
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Immutable item reference data, refreshed on a slow cadence by the
/// catalog sync. The engine treats it as read-only lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Item class name, e.g. "Weapon", "Armor", "Tradegoods".
    pub item_class: String,
    /// Item subclass name, e.g. "Sword", "Cloth".
    pub item_subclass: String,
    pub quality: ItemQuality,
    /// Owning expansion id.
    pub expansion_id: u32,
    /// Icon asset URL, if the media lookup succeeded.
    pub icon_url: Option<String>,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({}/{}, xp {})",
            self.name, self.quality, self.item_class, self.item_subclass, self.expansion_id
        )
    }
}

impl Item {
    /// Helper to build a test item with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: ItemId) -> Self {
        Item {
            id,
            name: format!("Test Item {id}"),
            item_class: "Weapon".to_string(),
            item_subclass: "Sword".to_string(),
            quality: ItemQuality::Rare,
            expansion_id: 9,
            icon_url: None,
        }
    }
}

/// Item rarity / quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemQuality {
    Poor,
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Artifact,
    Heirloom,
}

impl ItemQuality {
    /// Numeric tier as used by the rarity field of preset rules.
    pub fn tier(&self) -> u8 {
        match self {
            ItemQuality::Poor => 0,
            ItemQuality::Common => 1,
            ItemQuality::Uncommon => 2,
            ItemQuality::Rare => 3,
            ItemQuality::Epic => 4,
            ItemQuality::Legendary => 5,
            ItemQuality::Artifact => 6,
            ItemQuality::Heirloom => 7,
        }
    }
}

impl fmt::Display for ItemQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemQuality::Poor => write!(f, "Poor"),
            ItemQuality::Common => write!(f, "Common"),
            ItemQuality::Uncommon => write!(f, "Uncommon"),
            ItemQuality::Rare => write!(f, "Rare"),
            ItemQuality::Epic => write!(f, "Epic"),
            ItemQuality::Legendary => write!(f, "Legendary"),
            ItemQuality::Artifact => write!(f, "Artifact"),
            ItemQuality::Heirloom => write!(f, "Heirloom"),
        }
    }
}

/// Attempt to parse an API quality string (case-insensitive).
impl std::str::FromStr for ItemQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "POOR" => Ok(ItemQuality::Poor),
            "COMMON" => Ok(ItemQuality::Common),
            "UNCOMMON" => Ok(ItemQuality::Uncommon),
            "RARE" => Ok(ItemQuality::Rare),
            "EPIC" => Ok(ItemQuality::Epic),
            "LEGENDARY" => Ok(ItemQuality::Legendary),
            "ARTIFACT" => Ok(ItemQuality::Artifact),
            "HEIRLOOM" => Ok(ItemQuality::Heirloom),
            _ => Err(anyhow::anyhow!("Unknown item quality: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

/// A connected realm. Externally owned, read-only within the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    pub id: RealmId,
    pub name: String,
    /// Region slug, e.g. "eu", "us".
    pub region: String,
}

// ---------------------------------------------------------------------------
// Auction listings
// ---------------------------------------------------------------------------

/// A single auction listing from one realm snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionListing {
    pub auction_id: u64,
    pub item_id: ItemId,
    pub realm_id: RealmId,
    /// Buyout price in copper. Zero means bid-only.
    pub buyout: Copper,
    pub quantity: u32,
    pub seen_at: DateTime<Utc>,
}

impl AuctionListing {
    /// Normalised per-item price: buyout / quantity.
    ///
    /// `None` for bid-only listings (buyout 0) and invalid quantities —
    /// such listings are excluded from both scanning and baseline folding.
    pub fn unit_price(&self) -> Option<f64> {
        if self.buyout == 0 || self.quantity == 0 {
            return None;
        }
        Some(self.buyout as f64 / self.quantity as f64)
    }

    /// Helper to build a test listing (quantity 1).
    #[cfg(test)]
    pub fn sample(auction_id: u64, item_id: ItemId, realm_id: RealmId, buyout: Copper) -> Self {
        AuctionListing {
            auction_id,
            item_id,
            realm_id,
            buyout,
            quantity: 1,
            seen_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Price baseline
// ---------------------------------------------------------------------------

/// Rolling price statistics for one item, in the persisted snapshot form.
///
/// The average is a lifetime rolling average (not a sliding window); the
/// sample count accumulates monotonically and is never reset. An item with
/// no entry has no baseline and can never produce a snipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBaseline {
    pub average_unit_price: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Threshold resolution
// ---------------------------------------------------------------------------

/// Which tier produced a resolved threshold. Diagnostic only — precedence
/// is enforced by tier ordering, not by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    SpecialItem,
    ExpansionRarity,
    ExpansionClass,
    GlobalDefault,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::SpecialItem => write!(f, "special-item"),
            RuleSource::ExpansionRarity => write!(f, "expansion-rarity"),
            RuleSource::ExpansionClass => write!(f, "expansion-class"),
            RuleSource::GlobalDefault => write!(f, "global-default"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snipe results
// ---------------------------------------------------------------------------

/// A listing classified as a snipe. Ephemeral — constructed per run,
/// never persisted.
#[derive(Debug, Clone)]
pub struct SnipeCandidate {
    pub listing: AuctionListing,
    pub item: Item,
    /// Baseline average the listing was judged against (pre-update).
    pub baseline_avg: f64,
    /// Resolved threshold ratio in (0, 1].
    pub threshold: f64,
    /// unit_price / baseline_avg.
    pub ratio: f64,
    pub source: RuleSource,
}

/// A deduplicated, enriched snipe ready for the notification transport.
#[derive(Debug, Clone, Serialize)]
pub struct SnipeAlert {
    pub auction_id: u64,
    pub realm_id: RealmId,
    pub realm_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub icon_url: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    pub baseline_avg: f64,
    pub threshold: f64,
    pub ratio: f64,
}

impl fmt::Display for SnipeAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} — {} ({:.0}% of {} avg, auction {})",
            self.item_name,
            self.realm_name,
            format_gold(self.unit_price),
            self.ratio * 100.0,
            format_gold(self.baseline_avg),
            self.auction_id,
        )
    }
}

// ---------------------------------------------------------------------------
// Run reporting
// ---------------------------------------------------------------------------

/// Summary of a single run, for logging and health signalling.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub realms_ok: usize,
    pub realms_failed: usize,
    pub listings_fetched: usize,
    pub listings_relevant: usize,
    pub items_discovered: usize,
    pub snipes_found: usize,
    pub alerts_emitted: usize,
    pub baseline_items: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "realms {}/{} ok | {} listings ({} relevant) | {} new items | {} snipes -> {} alerts | {} baselines",
            self.realms_ok,
            self.realms_ok + self.realms_failed,
            self.listings_fetched,
            self.listings_relevant,
            self.items_discovered,
            self.snipes_found,
            self.alerts_emitted,
            self.baseline_items,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SNIPEWATCH.
///
/// Config and BaselineCorruption are fatal and abort the run before the
/// snapshot commit. Fetch is per-realm and non-fatal: the realm is
/// skipped for the run after retries are exhausted. A missing threshold
/// rule is not an error at all — resolution fails closed and the item is
/// simply never flagged.
#[derive(Debug, thiserror::Error)]
pub enum SnipeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Baseline snapshot corrupt at {path}: {message}")]
    BaselineCorruption { path: String, message: String },

    #[error("Fetch failed for realm {realm}: {message}")]
    Fetch { realm: RealmId, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // -- Unit price --

    #[test]
    fn test_unit_price_single() {
        let l = AuctionListing::sample(1, 100, 1080, 5_000);
        assert_eq!(l.unit_price(), Some(5_000.0));
    }

    #[test]
    fn test_unit_price_stack() {
        let mut l = AuctionListing::sample(1, 100, 1080, 5_000);
        l.quantity = 20;
        assert_eq!(l.unit_price(), Some(250.0));
    }

    #[test]
    fn test_unit_price_bid_only() {
        let l = AuctionListing::sample(1, 100, 1080, 0);
        assert_eq!(l.unit_price(), None);
    }

    #[test]
    fn test_unit_price_zero_quantity_invalid() {
        let mut l = AuctionListing::sample(1, 100, 1080, 5_000);
        l.quantity = 0;
        assert_eq!(l.unit_price(), None);
    }

    // -- Quality --

    #[test]
    fn test_quality_from_api_string() {
        assert_eq!(ItemQuality::from_str("EPIC").unwrap(), ItemQuality::Epic);
        assert_eq!(ItemQuality::from_str("rare").unwrap(), ItemQuality::Rare);
        assert!(ItemQuality::from_str("mythic").is_err());
    }

    #[test]
    fn test_quality_tiers_ordered() {
        assert!(ItemQuality::Poor.tier() < ItemQuality::Common.tier());
        assert!(ItemQuality::Rare.tier() < ItemQuality::Epic.tier());
        assert_eq!(ItemQuality::Heirloom.tier(), 7);
    }

    // -- Gold formatting --

    #[test]
    fn test_format_gold() {
        assert_eq!(format_gold(123_456.0), "12g 34s 56c");
        assert_eq!(format_gold(156.0), "1s 56c");
        assert_eq!(format_gold(42.0), "42c");
        assert_eq!(format_gold(10_000.0), "1g 00s 00c");
    }

    // -- Baseline snapshot schema --

    #[test]
    fn test_baseline_serialises_camel_case() {
        let b = PriceBaseline {
            average_unit_price: 1000.0,
            sample_count: 10,
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("averageUnitPrice"));
        assert!(json.contains("sampleCount"));
        assert!(json.contains("lastUpdated"));
    }

    // -- Error display --

    #[test]
    fn test_error_display() {
        let e = SnipeError::Fetch {
            realm: 1080,
            message: "timeout".into(),
        };
        assert_eq!(e.to_string(), "Fetch failed for realm 1080: timeout");
    }
}
