//! Cargo entry — the ledger line for one commodity.

use serde::{Deserialize, Serialize};

use chm_haulage::Haulage;

use crate::MICROS_SCALE;

// ---------------------------------------------------------------------------
// CargoKind
// ---------------------------------------------------------------------------

/// Acquisition provenance of carried units.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CargoKind {
    /// Freely owned (purchased, refined, crafted).
    Owned,
    /// Marked stolen by the game.
    Stolen,
    /// Held against one or more open haulage contracts.
    Contracted,
}

// ---------------------------------------------------------------------------
// CargoEntry
// ---------------------------------------------------------------------------

/// One ledger entry per commodity identifier (compared case-insensitively).
///
/// Invariant: `total() == owned + stolen + contracted` by construction; every
/// mutation goes through [`add_quantity`](CargoEntry::add_quantity) /
/// [`remove_quantity`](CargoEntry::remove_quantity) or the snapshot-merge
/// rebuild, which maintain it trivially.
///
/// An entry with `total() == 0` and no contracts must not survive the
/// operation that emptied it — callers apply [`should_retire`]
/// (CargoEntry::should_retire) after every potentially-zeroing mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CargoEntry {
    /// Stable commodity identifier.
    pub commodity_id: String,
    /// Resolved display name; ledger iteration order is by this field.
    pub display_name: String,
    /// Informational "rare goods" flag from the commodity definition.
    #[serde(default)]
    pub rare: bool,
    pub owned: u32,
    pub stolen: u32,
    pub contracted: u32,
    /// Weighted mean acquisition cost per unit, micro-credits. Updated only
    /// by owned additions; removals never change it.
    pub avg_price_micros: i64,
    /// Derived: sum of `remaining` over open contracts. Recomputed by
    /// [`calculate_need`](CargoEntry::calculate_need), never implicitly.
    #[serde(skip)]
    pub need: u32,
    /// Open/terminal haulage contracts for this commodity, unique per id.
    pub contracts: Vec<Haulage>,
}

impl CargoEntry {
    /// Create an empty entry. The display name defaults to the identifier
    /// until a commodity definition is resolved.
    pub fn new(commodity_id: impl Into<String>) -> Self {
        let commodity_id = commodity_id.into();
        Self {
            display_name: commodity_id.clone(),
            commodity_id,
            rare: false,
            owned: 0,
            stolen: 0,
            contracted: 0,
            avg_price_micros: 0,
            need: 0,
            contracts: Vec::new(),
        }
    }

    /// Total units carried across all provenances.
    pub fn total(&self) -> u32 {
        self.owned + self.stolen + self.contracted
    }

    /// `true` if this entry tracks `commodity_id` (case-insensitive).
    pub fn is_commodity(&self, commodity_id: &str) -> bool {
        self.commodity_id.eq_ignore_ascii_case(commodity_id)
    }

    // -----------------------------------------------------------------------
    // Quantity mutation
    // -----------------------------------------------------------------------

    /// Add `amount` units of the given provenance.
    ///
    /// Owned additions fold `unit_price_micros` into the weighted average:
    /// `(avg * owned_before + price * amount) / (owned_before + amount)`.
    /// Stolen and contracted additions ignore the price.
    pub fn add_quantity(&mut self, kind: CargoKind, amount: u32, unit_price_micros: i64) {
        if amount == 0 {
            return;
        }
        match kind {
            CargoKind::Owned => {
                let owned_before = i128::from(self.owned);
                let amount_w = i128::from(amount);
                let weighted = i128::from(self.avg_price_micros) * owned_before
                    + i128::from(unit_price_micros) * amount_w;
                self.avg_price_micros = (weighted / (owned_before + amount_w)) as i64;
                self.owned += amount;
            }
            CargoKind::Stolen => self.stolen += amount,
            CargoKind::Contracted => self.contracted += amount,
        }
    }

    /// Remove up to `amount` units of the given provenance, clamped to what
    /// is held. Never changes the average price.
    pub fn remove_quantity(&mut self, kind: CargoKind, amount: u32) {
        match kind {
            CargoKind::Owned => self.owned = self.owned.saturating_sub(amount),
            CargoKind::Stolen => self.stolen = self.stolen.saturating_sub(amount),
            CargoKind::Contracted => self.contracted = self.contracted.saturating_sub(amount),
        }
    }

    /// Average acquisition price in whole credits, rounded half-up.
    pub fn price(&self) -> i64 {
        (self.avg_price_micros + MICROS_SCALE / 2) / MICROS_SCALE
    }

    // -----------------------------------------------------------------------
    // Contracts
    // -----------------------------------------------------------------------

    /// Recompute `need`: the sum of `remaining` over open contracts.
    pub fn calculate_need(&mut self) {
        self.need = self
            .contracts
            .iter()
            .filter(|h| h.is_open())
            .map(|h| h.remaining)
            .sum();
    }

    pub fn contract(&self, contract_id: u64) -> Option<&Haulage> {
        self.contracts.iter().find(|h| h.contract_id == contract_id)
    }

    pub fn contract_mut(&mut self, contract_id: u64) -> Option<&mut Haulage> {
        self.contracts
            .iter_mut()
            .find(|h| h.contract_id == contract_id)
    }

    /// Attach a contract; a contract with the same id is replaced.
    pub fn add_contract(&mut self, haulage: Haulage) {
        if let Some(existing) = self.contract_mut(haulage.contract_id) {
            *existing = haulage;
        } else {
            self.contracts.push(haulage);
        }
    }

    /// Detach the contract with the given id. Returns `true` if one existed.
    pub fn remove_contract(&mut self, contract_id: u64) -> bool {
        let before = self.contracts.len();
        self.contracts.retain(|h| h.contract_id != contract_id);
        self.contracts.len() != before
    }

    /// Retirement rule: an empty entry with no contracts must leave the
    /// ledger.
    pub fn should_retire(&self) -> bool {
        self.contracts.is_empty() && self.total() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
