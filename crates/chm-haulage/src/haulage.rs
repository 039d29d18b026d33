//! Haulage lifecycle — one instance per accepted (or indirectly observed)
//! delivery contract.
//!
//! # State machine
//!
//! ```text
//!            fail (eject / expiry / shortfall)
//!   Active ───────────────────────────────────► Failed   (terminal)
//!      │
//!      │ complete (remaining == 0, not shared)
//!      └────────────────────────────────────► Complete  (terminal)
//! ```
//!
//! Terminal states admit no further transitions; the only way out is removal
//! of the contract itself (abandonment, stray sweep, or shared-contract
//! completion). Shared contracts never reach `Complete` — they are removed
//! outright when `remaining` hits zero.
//!
//! # `remaining` vs `need`
//!
//! Both start at the contracted `amount` and are updated at different points:
//! `remaining` is the total still outstanding against the contract (a wing
//! mate's deliveries count), while `need` is what is still required from the
//! player's own stock. Depot *Collect* progress updates only `remaining`;
//! *Deliver* and wing progress update both; the snapshot merge touches
//! neither. The difference `remaining - need` is the quantity currently on
//! board for the contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ContractType;

// ---------------------------------------------------------------------------
// HaulageStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a haulage contract.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaulageStatus {
    /// Contract is open; cargo is still being collected or delivered.
    Active,
    /// Contract failed (cargo ejected, expired, or shortfall detected). **Terminal.**
    Failed,
    /// Contract fulfilled; retained as a marker until the owning cargo entry
    /// is retired. **Terminal.**
    Complete,
}

impl HaulageStatus {
    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Complete)
    }
}

// ---------------------------------------------------------------------------
// Haulage
// ---------------------------------------------------------------------------

/// A tracked delivery contract, keyed by `contract_id` (unique across the
/// whole ledger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Haulage {
    /// Journal-assigned contract identifier.
    pub contract_id: u64,
    /// Raw contract name, e.g. `Mission_Delivery_Boom`.
    pub name: String,
    /// Canonical type derived once from `name`; `None` for names outside the
    /// tracked allow-list (placeholder contracts synthesized from snapshot or
    /// wing progress).
    pub contract_type: Option<ContractType>,
    pub status: HaulageStatus,
    /// System where the contract was accepted (or first observed).
    pub origin_system: Option<String>,
    /// Where the cargo comes from; populated opportunistically per type.
    pub source_system: Option<String>,
    pub source_body: Option<String>,
    /// Total quantity contracted.
    pub amount: u32,
    /// Quantity still outstanding against the contract, shared party included.
    pub remaining: u32,
    /// Quantity still required from the player's own stock.
    pub need: u32,
    /// Cumulative multi-party progress counters.
    pub collected: u32,
    pub delivered: u32,
    /// Venue identifiers; 0 = not yet known.
    pub start_market_id: u64,
    pub end_market_id: u64,
    pub expiry: Option<DateTime<Utc>>,
    /// First observed via multi-party progress rather than a direct accept.
    /// Removed entirely (never merely zeroed) on completion.
    pub shared: bool,
}

impl Haulage {
    /// Create a new contract in the `Active` state. `remaining` and `need`
    /// both start at `amount`.
    pub fn new(
        contract_id: u64,
        name: impl Into<String>,
        origin_system: Option<String>,
        amount: u32,
        expiry: Option<DateTime<Utc>>,
        shared: bool,
    ) -> Self {
        let name = name.into();
        let contract_type = ContractType::classify(&name);
        Self {
            contract_id,
            name,
            contract_type,
            status: HaulageStatus::Active,
            origin_system,
            source_system: None,
            source_body: None,
            amount,
            remaining: amount,
            need: amount,
            collected: 0,
            delivered: 0,
            start_market_id: 0,
            end_market_id: 0,
            expiry,
            shared,
        }
    }

    /// Quantity currently on board attributable to this contract
    /// (`remaining - need`, never negative).
    pub fn onboard(&self) -> u32 {
        self.remaining.saturating_sub(self.need)
    }

    /// `true` if the contract still counts toward a cargo entry's `need`.
    pub fn is_open(&self) -> bool {
        self.status == HaulageStatus::Active
    }

    /// Transition to `Failed`. Returns `true` if the status changed; no-op
    /// from a terminal state.
    pub fn mark_failed(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = HaulageStatus::Failed;
        true
    }

    /// Transition to `Complete`. Returns `true` if the status changed; no-op
    /// from a terminal state.
    pub fn mark_complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = HaulageStatus::Complete;
        true
    }

    /// `true` for delivery-like contracts (delivery/deliverywing/smuggle),
    /// which fail on ejection or shortfall of their bound cargo.
    pub fn is_delivery_like(&self) -> bool {
        self.contract_type.map_or(false, |t| t.is_delivery_like())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
