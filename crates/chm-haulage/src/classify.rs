//! Contract-type classification — maps raw contract names to a canonical type.
//!
//! Contract names follow the `Prefix_Type_Qualifier...` convention, e.g.
//! `Mission_Delivery_Boom` or `Mission_Salvage_Planet`. Classification takes
//! the second `_`-separated segment, lower-cased, then:
//!
//! - chained/renamed contract archetypes collapse through a fixed synonym
//!   table (two "chained" delivery variants -> delivery, two rescue variants
//!   -> salvage);
//! - the marker segments `ds`, `rs` and `welcome` redirect classification to
//!   the third segment;
//! - only the canonical allow-list below produces a [`ContractType`]; any
//!   other name classifies to `None` and is not tracked by the accept
//!   handler.
//!
//! All logic is deterministic and table-driven; no handler does its own
//! string matching.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ContractType
// ---------------------------------------------------------------------------

/// Canonical haulage contract archetypes.
///
/// This is the full allow-list: a contract whose name classifies outside this
/// set is ignored at accept time (it carries no cargo obligation we track).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Altruism,
    Collect,
    #[serde(rename = "collectwing")]
    CollectWing,
    Delivery,
    #[serde(rename = "deliverywing")]
    DeliveryWing,
    Mining,
    Piracy,
    Rescue,
    Salvage,
    Smuggle,
}

impl ContractType {
    /// Classify a raw contract name. Returns `None` for names outside the
    /// canonical allow-list (including names with no type segment at all).
    pub fn classify(name: &str) -> Option<ContractType> {
        let segments: Vec<&str> = name.split('_').collect();
        let mut segment = segments.get(1)?.to_ascii_lowercase();

        if let Some(canonical) = chained_synonym(&segment) {
            segment = canonical.to_string();
        } else if matches!(segment.as_str(), "ds" | "rs" | "welcome") {
            segment = segments.get(2)?.to_ascii_lowercase();
        }

        match segment.as_str() {
            "altruism" => Some(ContractType::Altruism),
            "collect" => Some(ContractType::Collect),
            "collectwing" => Some(ContractType::CollectWing),
            "delivery" => Some(ContractType::Delivery),
            "deliverywing" => Some(ContractType::DeliveryWing),
            "mining" => Some(ContractType::Mining),
            "piracy" => Some(ContractType::Piracy),
            "rescue" => Some(ContractType::Rescue),
            "salvage" => Some(ContractType::Salvage),
            "smuggle" => Some(ContractType::Smuggle),
            _ => None,
        }
    }

    /// Delivery-like contracts fail when their bound cargo is ejected or a
    /// contracted-quantity shortfall is detected during reconciliation.
    pub fn is_delivery_like(&self) -> bool {
        matches!(
            self,
            ContractType::Delivery | ContractType::DeliveryWing | ContractType::Smuggle
        )
    }

    /// Collection-type contracts: acquisition happens at a market, so the
    /// accept handler records the current market as the end market and a
    /// purchase stamps the source.
    pub fn is_collect_like(&self) -> bool {
        matches!(self, ContractType::Collect | ContractType::CollectWing)
    }

    /// Contracts whose cargo is gathered in the field: a collect or refine
    /// event stamps the current system/body as the contract source.
    pub fn sources_from_collection(&self) -> bool {
        matches!(
            self,
            ContractType::Mining | ContractType::Piracy | ContractType::Rescue | ContractType::Salvage
        )
    }

    /// Canonical lower-case name, matching the wire/persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Altruism => "altruism",
            ContractType::Collect => "collect",
            ContractType::CollectWing => "collectwing",
            ContractType::Delivery => "delivery",
            ContractType::DeliveryWing => "deliverywing",
            ContractType::Mining => "mining",
            ContractType::Piracy => "piracy",
            ContractType::Rescue => "rescue",
            ContractType::Salvage => "salvage",
            ContractType::Smuggle => "smuggle",
        }
    }
}

/// Chained-mission archetypes that collapse to a canonical type.
fn chained_synonym(segment: &str) -> Option<&'static str> {
    match segment {
        "clearingthepath" => Some("delivery"),
        "helpfinishtheorder" => Some("delivery"),
        "rescuefromthetwins" => Some("salvage"),
        "rescuethewares" => Some("salvage"),
        _ => None,
    }
}

/// Naval/rank progression missions carry a `rank` marker in the name; their
/// delivery contracts do not record a start market.
pub fn is_rank_mission(name: &str) -> bool {
    name.to_ascii_lowercase().contains("rank")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
