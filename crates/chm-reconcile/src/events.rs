//! Telemetry event model — the tagged union the reconciler consumes, plus the
//! wire-level snapshot structs and their normalization.
//!
//! # Purpose
//! The telemetry source emits journal lines in its own JSON schema. This
//! module defines the *raw* (wire-level) structs that mirror the cargo
//! snapshot line format and a single [`normalize_cargo_snapshot`] function
//! that converts them into the internal [`TelemetryEvent`] consumed by the
//! reconciliation engine. All other events are constructed directly by the
//! feed layer.
//!
//! # Design constraints
//! - Pure, deterministic conversion. No IO, no async.
//! - All normalization errors are surfaced as [`SnapshotWireError`]; callers
//!   decide whether to drop the line or retry.
//! - Unknown fields are silently ignored (`deny_unknown_fields` is NOT set so
//!   that future journal additions don't break deserialization).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Core event types
// ---------------------------------------------------------------------------

/// One timestamped telemetry event. Timestamps drive the ordering gate: an
/// event at or before the last applied timestamp is silently ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl TelemetryEvent {
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }
}

/// Vehicle the player occupies when an event fires. Quantity updates from
/// collect/eject events apply only off-ship; on-ship they are deferred to the
/// authoritative snapshot that follows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vehicle {
    Ship,
    Srv,
    Fighter,
    OnFoot,
}

/// Depot transaction step reported by a cargo-depot update.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepotUpdate {
    /// Cargo picked up at the source depot.
    Collect,
    /// Cargo handed in at the destination depot.
    Deliver,
    /// A wing-mate's depot transaction observed remotely.
    WingUpdate,
}

/// One line of a cargo snapshot: a (commodity, contract) bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CargoSnapshotLine {
    pub commodity_id: String,
    pub count: u32,
    pub stolen: u32,
    pub contract_id: Option<u64>,
}

/// Payload of a cargo-depot progress event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CargoDepotUpdate {
    pub contract_id: u64,
    pub update: DepotUpdate,
    /// Absent on wing updates observed before the commodity is known.
    pub commodity_id: Option<String>,
    /// Units moved in this transaction.
    pub count: u32,
    /// Venue identifiers; 0 = not reported.
    pub start_market_id: u64,
    pub end_market_id: u64,
    /// Cumulative multi-party progress counters.
    pub collected: u32,
    pub delivered: u32,
    pub total_to_deliver: u32,
}

impl CargoDepotUpdate {
    /// Units still outstanding against the contract after this update.
    pub fn amount_remaining(&self) -> u32 {
        self.total_to_deliver.saturating_sub(self.delivered)
    }
}

/// The full event vocabulary. Every kind maps to exactly one handler in the
/// engine's dispatch match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Authoritative hold manifest. Applied only when reported for the ship.
    CargoSnapshot {
        vessel: Vehicle,
        cargo_carried: u32,
        inventory: Option<Vec<CargoSnapshotLine>>,
    },
    /// One unit scooped (off-ship vehicles only affect quantities directly).
    CommodityCollected {
        commodity_id: String,
        contract_id: Option<u64>,
        stolen: bool,
    },
    CommodityEjected {
        commodity_id: String,
        amount: u32,
        contract_id: Option<u64>,
    },
    CommodityPurchased {
        commodity_id: String,
        amount: u32,
        price_micros: i64,
    },
    CommodityRefined { commodity_id: String },
    /// Flags the haulage-shortfall check for the next snapshot merge; the
    /// quantity change itself arrives with that snapshot.
    CommoditySold { commodity_id: String, amount: u32 },
    LimpetPurchased { amount: u32, price_micros: i64 },
    CargoDepot(CargoDepotUpdate),
    MissionAccepted {
        contract_id: u64,
        name: String,
        commodity_id: Option<String>,
        amount: Option<u32>,
        destination_system: Option<String>,
        expiry: Option<DateTime<Utc>>,
    },
    MissionCompleted {
        contract_id: u64,
        commodity_id: Option<String>,
        has_commodity_rewards: bool,
    },
    MissionExpired { contract_id: u64 },
    MissionFailed { contract_id: u64 },
    MissionAbandoned { contract_id: u64 },
    /// Authoritative list of live contract ids; everything else is a stray.
    Missions { active_ids: Vec<u64> },
    /// Ship destroyed: the hold is gone.
    Died,
    EngineerContributed {
        commodity_id: Option<String>,
        amount: u32,
    },
    /// Crafting; recipes containing `limpet` produce four drones.
    Synthesised { recipe: String },
    /// Derived single-party progress synthesized from a wing update. Returned
    /// to the caller for the outer telemetry bus; a no-op for the ledger when
    /// it re-enters dispatch (the wing handler already applied the progress).
    WingCargoDelta {
        contract_id: u64,
        step: DepotUpdate,
        commodity_id: String,
        amount: u32,
        collected: u32,
        delivered: u32,
        total_to_deliver: u32,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All errors that can occur during snapshot normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotWireError {
    /// The `Vessel` string could not be mapped to [`Vehicle`].
    UnknownVehicle { raw: String },
    /// An inventory line has an empty commodity name.
    MissingCommodity { index: usize },
}

impl std::fmt::Display for SnapshotWireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVehicle { raw } => {
                write!(f, "cargo snapshot has unrecognised vessel '{raw}'")
            }
            Self::MissingCommodity { index } => {
                write!(f, "cargo snapshot line {index} has an empty commodity name")
            }
        }
    }
}

impl std::error::Error for SnapshotWireError {}

// ---------------------------------------------------------------------------
// Raw wire-level structs  (journal JSON → these → internal types)
// ---------------------------------------------------------------------------

/// Wire-level cargo snapshot as emitted by the journal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCargoSnapshot {
    #[serde(rename = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Vessel string: `"Ship"` | `"SRV"` | `"Fighter"` (case-insensitive).
    pub vessel: String,
    /// Total units carried.
    pub count: u32,
    /// Absent on abbreviated snapshots that only refresh the total.
    pub inventory: Option<Vec<RawCargoSnapshotLine>>,
}

/// Wire-level inventory line of a cargo snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCargoSnapshotLine {
    /// Commodity identifier (must be non-empty).
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub stolen: u32,
    #[serde(rename = "MissionID", default)]
    pub mission_id: Option<u64>,
}

fn normalize_vehicle(raw: &str) -> Result<Vehicle, SnapshotWireError> {
    match raw.to_ascii_lowercase().as_str() {
        "ship" => Ok(Vehicle::Ship),
        "srv" => Ok(Vehicle::Srv),
        "fighter" => Ok(Vehicle::Fighter),
        "onfoot" => Ok(Vehicle::OnFoot),
        _ => Err(SnapshotWireError::UnknownVehicle {
            raw: raw.to_string(),
        }),
    }
}

/// Convert a wire-level snapshot into the internal event form.
pub fn normalize_cargo_snapshot(
    raw: &RawCargoSnapshot,
) -> Result<TelemetryEvent, SnapshotWireError> {
    let vessel = normalize_vehicle(&raw.vessel)?;
    let inventory = match &raw.inventory {
        None => None,
        Some(lines) => {
            let mut out = Vec::with_capacity(lines.len());
            for (index, line) in lines.iter().enumerate() {
                if line.name.is_empty() {
                    return Err(SnapshotWireError::MissingCommodity { index });
                }
                out.push(CargoSnapshotLine {
                    commodity_id: line.name.clone(),
                    count: line.count,
                    stolen: line.stolen,
                    contract_id: line.mission_id,
                });
            }
            Some(out)
        }
    };
    Ok(TelemetryEvent::new(
        raw.timestamp,
        EventKind::CargoSnapshot {
            vessel,
            cargo_carried: raw.count,
            inventory,
        },
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
