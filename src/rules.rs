//! Threshold resolution.
//!
//! Resolves the buyout-ratio threshold for an item through a fixed
//! precedence chain: special-item override > rarity-qualified expansion
//! preset > class-only expansion preset > global default. Tiers are an
//! ordered list of matchers evaluated first-match-wins, so new tiers can
//! be inserted without touching existing logic.
//!
//! Resolution fails closed: with no matching rule and no global default,
//! the item is never flagged.

use std::collections::HashMap;

use crate::config::{PresetRule, RuleSet, SpecialRule};
use crate::types::{Copper, Item, ItemId, RuleSource};

// ---------------------------------------------------------------------------
// Resolved threshold
// ---------------------------------------------------------------------------

/// Outcome of a successful threshold resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedThreshold {
    /// Ratio in (0, 1]; a listing snipes iff unit_price / baseline < ratio.
    pub ratio: f64,
    /// Hard unit-price cap, only ever set by special-item rules.
    pub ceiling: Option<Copper>,
    /// Which tier matched, for diagnostics.
    pub source: RuleSource,
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// One precedence level in the resolution chain.
trait ThresholdTier: Send + Sync {
    /// Return a threshold if this tier has a rule for the item.
    fn resolve(&self, item: &Item) -> Option<ResolvedThreshold>;
}

/// Tier 1: explicit per-item overrides. An exact id match wins
/// immediately, ignoring all other tiers.
struct SpecialItemTier {
    rules: HashMap<ItemId, SpecialRule>,
}

impl ThresholdTier for SpecialItemTier {
    fn resolve(&self, item: &Item) -> Option<ResolvedThreshold> {
        self.rules.get(&item.id).map(|rule| ResolvedThreshold {
            ratio: rule.threshold_ratio,
            ceiling: rule.absolute_max_price,
            source: RuleSource::SpecialItem,
        })
    }
}

/// Tier 2: (expansion, item class, optional rarity) presets. Within an
/// expansion, a rarity-qualified rule beats a class-only rule for the
/// same class. Duplicate rarity-qualified keys are rejected at config
/// load, so at most one rule of each specificity can match.
struct ExpansionPresetTier {
    rules: HashMap<u32, Vec<PresetRule>>,
}

impl ThresholdTier for ExpansionPresetTier {
    fn resolve(&self, item: &Item) -> Option<ResolvedThreshold> {
        let rules = self.rules.get(&item.expansion_id)?;

        let mut class_only: Option<&PresetRule> = None;
        for rule in rules {
            if !rule.item_class.eq_ignore_ascii_case(&item.item_class) {
                continue;
            }
            match rule.rarity {
                Some(r) if r == item.quality.tier() => {
                    return Some(ResolvedThreshold {
                        ratio: rule.threshold_ratio,
                        ceiling: None,
                        source: RuleSource::ExpansionRarity,
                    });
                }
                Some(_) => {} // rarity-qualified for a different rarity
                None => class_only = Some(rule),
            }
        }

        class_only.map(|rule| ResolvedThreshold {
            ratio: rule.threshold_ratio,
            ceiling: None,
            source: RuleSource::ExpansionClass,
        })
    }
}

/// Tier 3: global default. Absent default means the chain falls through
/// and resolution fails closed.
struct GlobalDefaultTier {
    ratio: Option<f64>,
}

impl ThresholdTier for GlobalDefaultTier {
    fn resolve(&self, _item: &Item) -> Option<ResolvedThreshold> {
        self.ratio.map(|ratio| ResolvedThreshold {
            ratio,
            ceiling: None,
            source: RuleSource::GlobalDefault,
        })
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Precedence-ordered threshold resolver.
pub struct ThresholdResolver {
    tiers: Vec<Box<dyn ThresholdTier>>,
}

impl ThresholdResolver {
    /// Build the resolver chain from a validated rule set.
    pub fn from_rules(rules: &RuleSet) -> Self {
        Self {
            tiers: vec![
                Box::new(SpecialItemTier {
                    rules: rules.special.clone(),
                }),
                Box::new(ExpansionPresetTier {
                    rules: rules.presets.clone(),
                }),
                Box::new(GlobalDefaultTier {
                    ratio: rules.default_ratio,
                }),
            ],
        }
    }

    /// Resolve the applicable threshold for an item, first-match-wins.
    ///
    /// `None` means no tier matched and no default is configured — the
    /// caller must skip the item, never substitute an arbitrary value.
    pub fn resolve(&self, item: &Item) -> Option<ResolvedThreshold> {
        self.tiers.iter().find_map(|tier| tier.resolve(item))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
