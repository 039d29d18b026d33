//! chm-ledger
//!
//! Per-commodity quantity ledger:
//! - owned / stolen / contracted counters with `total` conservation
//! - weighted-average acquisition price in micro-credits
//! - derived `need` from open haulage contracts
//! - retirement rule for emptied entries
//!
//! Pure deterministic arithmetic; no event awareness, no IO. All removals
//! are clamped rather than rejected — there are no error conditions here.

mod catalog;
mod entry;

pub use catalog::{CommodityCatalog, CommodityFacts, NullCommodityCatalog};
pub use entry::{CargoEntry, CargoKind};

/// Price/cash scale: micro-credits (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;

/// Commodity identifier for limpet drones, the one commodity the engine
/// creates by name (limpet purchase and synthesis events carry no id).
pub const DRONES: &str = "drones";
