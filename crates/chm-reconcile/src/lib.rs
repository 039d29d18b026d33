//! chm-reconcile
//!
//! Event-sourced cargo-hold reconciliation:
//! - Telemetry event model with wire-level snapshot normalization
//! - Monotonic event-ordering gate
//! - Snapshot merge against the authoritative hold manifest
//! - Depot progress and wing synchronization with derived events
//! - Single-lock engine with a persistence/notification boundary
//!
//! Deterministic domain logic; the only side effects are the [`LedgerSink`]
//! and subscriber calls, both made outside the inventory lock.

mod context;
mod engine;
mod events;
mod gate;
mod inventory;
mod merge;
mod wing;

pub use context::{GameContext, InventorySubscriber, LedgerSink, NullLedgerSink};
pub use engine::CargoReconciler;
pub use events::{
    normalize_cargo_snapshot, CargoDepotUpdate, CargoSnapshotLine, DepotUpdate, EventKind,
    RawCargoSnapshot, RawCargoSnapshotLine, SnapshotWireError, TelemetryEvent, Vehicle,
};
pub use gate::{EventFreshness, UpdateGate};

pub use chm_config::CargoHoldConfig;
pub use chm_haulage::{
    is_rank_mission, ContractType, Haulage, HaulageStatus, MissionCatalog, MissionFacts,
    NullMissionCatalog,
};
pub use chm_ledger::{
    CargoEntry, CargoKind, CommodityCatalog, CommodityFacts, NullCommodityCatalog, DRONES,
    MICROS_SCALE,
};
