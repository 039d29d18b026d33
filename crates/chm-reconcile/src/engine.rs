//! Reconciliation engine — dispatches telemetry events to the entry book.
//!
//! # Purpose
//! [`CargoReconciler`] owns the in-memory ledger behind a single lock and
//! applies every event through one exhaustive dispatch match: ordering gate,
//! exactly one handler, then persistence and subscriber notification with the
//! lock released.
//!
//! # Invariants
//! - **One lock**: all reads and writes of the entry book go through it.
//! - **Gate first**: an event at or before the last applied timestamp never
//!   reaches a handler. Event-specific preconditions (a cargo mission needs a
//!   commodity) are checked before the gate advances.
//! - **Persist/notify post-unlock**: the ledger clone handed to the sink and
//!   subscribers is taken inside the lock; the calls happen outside it.
//! - **Derived events drain in their own pass**: wing-synthesized events are
//!   dispatched after the triggering event completes, each with a fresh lock
//!   acquisition, and are returned to the caller for the outer bus.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use chm_config::CargoHoldConfig;
use chm_haulage::{is_rank_mission, ContractType, Haulage, MissionCatalog};
use chm_ledger::{CargoEntry, CargoKind, CommodityCatalog, DRONES};

use crate::context::{GameContext, InventorySubscriber, LedgerSink};
use crate::events::{CargoDepotUpdate, CargoSnapshotLine, EventKind, TelemetryEvent, Vehicle};
use crate::gate::UpdateGate;
use crate::inventory::{
    ensure_entry, entry_index, entry_index_with_contract, retire_or_recompute,
};
use crate::{merge, wing};

/// Limpets crafted per synthesis of a limpet recipe.
const SYNTHESIS_LIMPETS: u32 = 4;

// ---------------------------------------------------------------------------
// CargoReconciler
// ---------------------------------------------------------------------------

struct Inner {
    entries: Vec<CargoEntry>,
    cargo_carried: u32,
    gate: UpdateGate,
    /// Set by a sale; consumed by the next snapshot merge to detect contracts
    /// whose cargo was sold out from under them.
    check_haulage: bool,
}

impl Inner {
    fn to_config(&self) -> CargoHoldConfig {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        CargoHoldConfig {
            updated_at: self.gate.last_applied(),
            cargo_carried: self.cargo_carried,
            entries,
        }
    }
}

/// Event-sourced cargo-hold reconciler.
pub struct CargoReconciler {
    inner: Mutex<Inner>,
    missions: Arc<dyn MissionCatalog>,
    commodities: Arc<dyn CommodityCatalog>,
    sink: Arc<dyn LedgerSink>,
    subscribers: Mutex<Vec<InventorySubscriber>>,
}

impl CargoReconciler {
    /// An empty reconciler with no event history.
    pub fn new(
        missions: Arc<dyn MissionCatalog>,
        commodities: Arc<dyn CommodityCatalog>,
        sink: Arc<dyn LedgerSink>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                cargo_carried: 0,
                gate: UpdateGate::new(),
                check_haulage: false,
            }),
            missions,
            commodities,
            sink,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Resume from a persisted ledger: entries are re-seeded through the
    /// commodity catalog and the ordering gate continues from the stored
    /// high-water mark.
    pub fn from_config(
        config: CargoHoldConfig,
        missions: Arc<dyn MissionCatalog>,
        commodities: Arc<dyn CommodityCatalog>,
        sink: Arc<dyn LedgerSink>,
    ) -> Self {
        let gate = UpdateGate::seeded(config.updated_at);
        let cargo_carried = config.cargo_carried;
        let entries = config.seed(&*commodities);
        Self {
            inner: Mutex::new(Inner {
                entries,
                cargo_carried,
                gate,
                check_haulage: false,
            }),
            missions,
            commodities,
            sink,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback invoked with the post-mutation ledger state after
    /// every persisted change, outside the inventory lock.
    pub fn subscribe(&self, subscriber: impl Fn(&CargoHoldConfig) + Send + Sync + 'static) {
        self.lock_subscribers().push(Box::new(subscriber));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Ordered ledger state: entries by display name, total carried, and the
    /// last applied timestamp.
    pub fn snapshot(&self) -> CargoHoldConfig {
        self.lock_inner().to_config()
    }

    pub fn entry(&self, commodity_id: &str) -> Option<CargoEntry> {
        let inner = self.lock_inner();
        entry_index(&inner.entries, commodity_id).map(|i| inner.entries[i].clone())
    }

    pub fn entry_with_contract(&self, contract_id: u64) -> Option<CargoEntry> {
        let inner = self.lock_inner();
        entry_index_with_contract(&inner.entries, contract_id).map(|i| inner.entries[i].clone())
    }

    pub fn contract(&self, contract_id: u64) -> Option<Haulage> {
        self.entry_with_contract(contract_id)
            .and_then(|e| e.contract(contract_id).cloned())
    }

    pub fn cargo_carried(&self) -> u32 {
        self.lock_inner().cargo_carried
    }

    pub fn last_applied(&self) -> Option<DateTime<Utc>> {
        self.lock_inner().gate.last_applied()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Apply one event. Returns the derived events synthesized while applying
    /// it (wing progress deltas), already dispatched, for the outer bus.
    pub fn apply(&self, event: &TelemetryEvent, ctx: &GameContext) -> Vec<TelemetryEvent> {
        let mut emitted = Vec::new();
        let mut pending = vec![event.clone()];
        while let Some(next) = pending.pop() {
            let derived = self.dispatch(&next, ctx);
            emitted.extend(derived.iter().cloned());
            pending.extend(derived);
        }
        emitted
    }

    fn dispatch(&self, event: &TelemetryEvent, ctx: &GameContext) -> Vec<TelemetryEvent> {
        let mut inner = self.lock_inner();

        // Preconditions that keep the gate from advancing on events this
        // monitor does not track.
        match &event.kind {
            EventKind::MissionAccepted { commodity_id, .. } if commodity_id.is_none() => {
                return Vec::new();
            }
            EventKind::MissionCompleted {
                commodity_id,
                has_commodity_rewards,
                ..
            } if commodity_id.is_none() && !has_commodity_rewards => {
                return Vec::new();
            }
            _ => {}
        }

        if inner.gate.accept(event.timestamp).is_stale() {
            trace!(timestamp = %event.timestamp, "stale event ignored");
            return Vec::new();
        }

        let mut derived = Vec::new();
        let mutated = match &event.kind {
            EventKind::CargoSnapshot {
                vessel,
                cargo_carried,
                inventory,
            } => self.handle_snapshot(&mut inner, *vessel, *cargo_carried, inventory.as_deref()),
            EventKind::CommodityCollected {
                commodity_id,
                contract_id,
                stolen,
            } => self.handle_collected(&mut inner, ctx, commodity_id, *contract_id, *stolen),
            EventKind::CommodityEjected {
                commodity_id,
                amount,
                contract_id,
            } => self.handle_ejected(&mut inner, ctx, commodity_id, *amount, *contract_id),
            EventKind::CommodityPurchased {
                commodity_id,
                amount,
                price_micros,
            } => self.handle_purchased(&mut inner, ctx, commodity_id, *amount, *price_micros),
            EventKind::CommodityRefined { commodity_id } => {
                self.handle_refined(&mut inner, ctx, commodity_id)
            }
            EventKind::CommoditySold { commodity_id, .. } => {
                if entry_index(&inner.entries, commodity_id).is_some() {
                    inner.check_haulage = true;
                }
                false
            }
            EventKind::LimpetPurchased {
                amount,
                price_micros,
            } => {
                let index = ensure_entry(&mut inner.entries, DRONES, &*self.commodities);
                inner.entries[index].add_quantity(CargoKind::Owned, *amount, *price_micros);
                true
            }
            EventKind::CargoDepot(update) => {
                derived.extend(self.handle_depot(&mut inner, ctx, update, event.timestamp));
                true
            }
            EventKind::MissionAccepted {
                contract_id,
                name,
                commodity_id,
                amount,
                destination_system,
                expiry,
            } => match commodity_id {
                Some(commodity_id) => self.handle_mission_accepted(
                    &mut inner,
                    ctx,
                    *contract_id,
                    name,
                    commodity_id,
                    *amount,
                    destination_system.as_deref(),
                    *expiry,
                ),
                None => false,
            },
            EventKind::MissionCompleted {
                contract_id,
                commodity_id,
                ..
            } => self.handle_mission_completed(&mut inner, *contract_id, commodity_id.as_deref()),
            EventKind::MissionExpired { contract_id } => {
                self.handle_mission_expired(&mut inner, *contract_id)
            }
            EventKind::MissionFailed { contract_id } => {
                self.handle_mission_shortfall(&mut inner, *contract_id, false)
            }
            EventKind::MissionAbandoned { contract_id } => {
                self.handle_mission_shortfall(&mut inner, *contract_id, true)
            }
            EventKind::Missions { active_ids } => self.handle_missions(&mut inner, active_ids),
            EventKind::Died => {
                inner.entries.clear();
                true
            }
            EventKind::EngineerContributed {
                commodity_id,
                amount,
            } => self.handle_engineer_contributed(&mut inner, commodity_id.as_deref(), *amount),
            EventKind::Synthesised { recipe } => {
                if recipe.to_ascii_lowercase().contains("limpet") {
                    let index = ensure_entry(&mut inner.entries, DRONES, &*self.commodities);
                    inner.entries[index].add_quantity(CargoKind::Owned, SYNTHESIS_LIMPETS, 0);
                    true
                } else {
                    false
                }
            }
            // Progress already applied by the wing handler that derived it.
            EventKind::WingCargoDelta { .. } => false,
        };

        if mutated {
            let config = inner.to_config();
            drop(inner);
            self.sink.persist(&config);
            debug!(
                entries = config.entries.len(),
                cargo_carried = config.cargo_carried,
                "cargo ledger persisted"
            );
            for subscriber in self.lock_subscribers().iter() {
                subscriber(&config);
            }
        }
        derived
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn handle_snapshot(
        &self,
        inner: &mut Inner,
        vessel: Vehicle,
        cargo_carried: u32,
        inventory: Option<&[CargoSnapshotLine]>,
    ) -> bool {
        if vessel == Vehicle::Ship {
            inner.cargo_carried = cargo_carried;
            if let Some(lines) = inventory {
                let check_haulage = inner.check_haulage;
                merge::merge_snapshot(
                    &mut inner.entries,
                    lines,
                    check_haulage,
                    &*self.missions,
                    &*self.commodities,
                );
                inner.check_haulage = false;
            }
        }
        // The high-water mark moved even for off-ship snapshots.
        true
    }

    fn handle_collected(
        &self,
        inner: &mut Inner,
        ctx: &GameContext,
        commodity_id: &str,
        contract_id: Option<u64>,
        stolen: bool,
    ) -> bool {
        let index = match entry_index(&inner.entries, commodity_id) {
            Some(index) => index,
            None => return false,
        };
        let mut update = false;
        let entry = &mut inner.entries[index];
        let contracted = contract_id.map_or(false, |id| entry.contract(id).is_some());

        // On-ship pickups are quantified by the snapshot that follows.
        if ctx.vehicle != Vehicle::Ship {
            if contracted {
                entry.add_quantity(CargoKind::Contracted, 1, 0);
            } else if stolen {
                entry.add_quantity(CargoKind::Stolen, 1, 0);
            } else {
                entry.add_quantity(CargoKind::Owned, 1, 0);
            }
            entry.calculate_need();
            update = true;
        }

        if let Some(haulage) = contract_id.and_then(|id| entry.contract_mut(id)) {
            if haulage
                .contract_type
                .map_or(false, |t| t.sources_from_collection())
            {
                haulage.source_system = ctx.system.clone();
                haulage.source_body = ctx.body.clone();
                update = true;
            }
        }
        update
    }

    fn handle_ejected(
        &self,
        inner: &mut Inner,
        ctx: &GameContext,
        commodity_id: &str,
        amount: u32,
        contract_id: Option<u64>,
    ) -> bool {
        let index = match entry_index(&inner.entries, commodity_id) {
            Some(index) => index,
            None => return false,
        };
        let mut update = false;
        let entry = &mut inner.entries[index];

        if ctx.vehicle != Vehicle::Ship {
            let kind = if contract_id.is_some() {
                CargoKind::Contracted
            } else {
                CargoKind::Owned
            };
            entry.remove_quantity(kind, amount);
            entry.calculate_need();
            update = true;
        }

        // Throwing contracted delivery cargo overboard forfeits the contract.
        if let Some(haulage) = contract_id.and_then(|id| entry.contract_mut(id)) {
            if haulage.is_delivery_like() && haulage.mark_failed() {
                update = true;
            }
        }
        update
    }

    fn handle_purchased(
        &self,
        inner: &mut Inner,
        ctx: &GameContext,
        commodity_id: &str,
        amount: u32,
        price_micros: i64,
    ) -> bool {
        let index = ensure_entry(&mut inner.entries, commodity_id, &*self.commodities);
        let entry = &mut inner.entries[index];
        let collect_contract = entry
            .contracts
            .iter()
            .position(|h| h.contract_type.map_or(false, |t| t.is_collect_like()));
        match collect_contract {
            Some(i) => {
                let haulage = &mut entry.contracts[i];
                haulage.source_system = ctx.system.clone();
                haulage.source_body = ctx.station.clone();
                entry.add_quantity(CargoKind::Contracted, amount, 0);
            }
            None => entry.add_quantity(CargoKind::Owned, amount, price_micros),
        }
        true
    }

    fn handle_refined(&self, inner: &mut Inner, ctx: &GameContext, commodity_id: &str) -> bool {
        let index = match entry_index(&inner.entries, commodity_id) {
            Some(index) => index,
            None => return false,
        };
        let mining_contract = inner.entries[index]
            .contracts
            .iter_mut()
            .find(|h| h.contract_type == Some(ContractType::Mining));
        match mining_contract {
            Some(haulage) => {
                haulage.source_system = ctx.system.clone();
                haulage.source_body = ctx.station.clone();
                true
            }
            None => false,
        }
    }

    fn handle_depot(
        &self,
        inner: &mut Inner,
        ctx: &GameContext,
        update: &CargoDepotUpdate,
        at: DateTime<Utc>,
    ) -> Option<TelemetryEvent> {
        // Derived events must themselves pass the ordering gate.
        let derived_stamp = at + Duration::milliseconds(1);
        wing::apply_depot(
            &mut inner.entries,
            update,
            ctx,
            &*self.missions,
            &*self.commodities,
            derived_stamp,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_mission_accepted(
        &self,
        inner: &mut Inner,
        ctx: &GameContext,
        contract_id: u64,
        name: &str,
        commodity_id: &str,
        amount: Option<u32>,
        destination_system: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> bool {
        // Duplicate accept (journal replay across the gate boundary).
        if entry_index_with_contract(&inner.entries, contract_id).is_some() {
            return false;
        }
        let contract_type = match ContractType::classify(name) {
            Some(contract_type) => contract_type,
            None => return false,
        };

        let mut haulage = Haulage::new(
            contract_id,
            name,
            ctx.system.clone(),
            amount.unwrap_or(0),
            expiry,
            false,
        );
        let naval = is_rank_mission(name);
        if matches!(
            contract_type,
            ContractType::Delivery | ContractType::DeliveryWing
        ) && !naval
        {
            haulage.start_market_id = ctx.market_id;
        }
        if contract_type.is_collect_like() {
            haulage.end_market_id = ctx.market_id;
        }
        if contract_type.is_delivery_like() {
            haulage.source_system = ctx.system.clone();
            haulage.source_body = ctx.station.clone();
        } else if matches!(contract_type, ContractType::Rescue | ContractType::Salvage) {
            haulage.source_system = destination_system.map(str::to_string);
        }

        let index = ensure_entry(&mut inner.entries, commodity_id, &*self.commodities);
        inner.entries[index].add_contract(haulage);
        inner.entries[index].calculate_need();
        true
    }

    fn handle_mission_completed(
        &self,
        inner: &mut Inner,
        contract_id: u64,
        commodity_id: Option<&str>,
    ) -> bool {
        let index = match commodity_id.and_then(|c| entry_index(&inner.entries, c)) {
            Some(index) => index,
            None => return false,
        };
        inner.entries[index].remove_contract(contract_id);
        retire_or_recompute(&mut inner.entries, index);
        true
    }

    fn handle_mission_expired(&self, inner: &mut Inner, contract_id: u64) -> bool {
        let index = match entry_index_with_contract(&inner.entries, contract_id) {
            Some(index) => index,
            None => return false,
        };
        let entry = &mut inner.entries[index];
        let failed = entry
            .contract_mut(contract_id)
            .map_or(false, Haulage::mark_failed);
        if failed {
            entry.calculate_need();
        }
        failed
    }

    /// Shared shortfall conversion for failed and abandoned missions:
    /// contracted units still on board become stolen goods. A failed contract
    /// stays on the books as a marker; an abandoned one is removed outright.
    fn handle_mission_shortfall(&self, inner: &mut Inner, contract_id: u64, remove: bool) -> bool {
        let index = match entry_index_with_contract(&inner.entries, contract_id) {
            Some(index) => index,
            None => return false,
        };
        let entry = &mut inner.entries[index];
        let onboard = entry.contract(contract_id).map_or(0, Haulage::onboard);
        entry.remove_quantity(CargoKind::Contracted, onboard);
        entry.add_quantity(CargoKind::Stolen, onboard, 0);
        if remove {
            entry.remove_contract(contract_id);
        } else if let Some(haulage) = entry.contract_mut(contract_id) {
            haulage.mark_failed();
        }
        retire_or_recompute(&mut inner.entries, index);
        true
    }

    fn handle_missions(&self, inner: &mut Inner, active_ids: &[u64]) -> bool {
        let mut update = false;
        let mut index = 0;
        while index < inner.entries.len() {
            let entry = &mut inner.entries[index];
            let before = entry.contracts.len();
            entry
                .contracts
                .retain(|h| active_ids.contains(&h.contract_id));
            if entry.contracts.len() != before {
                update = true;
                if entry.should_retire() {
                    inner.entries.remove(index);
                    continue;
                }
                entry.calculate_need();
            }
            index += 1;
        }
        update
    }

    fn handle_engineer_contributed(
        &self,
        inner: &mut Inner,
        commodity_id: Option<&str>,
        amount: u32,
    ) -> bool {
        let index = match commodity_id.and_then(|c| entry_index(&inner.entries, c)) {
            Some(index) => index,
            None => return false,
        };
        let entry = &mut inner.entries[index];
        let removed = entry.owned.min(amount);
        entry.remove_quantity(CargoKind::Owned, removed);
        retire_or_recompute(&mut inner.entries, index);
        true
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<InventorySubscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NullLedgerSink;
    use chm_haulage::{HaulageStatus, NullMissionCatalog};
    use chm_ledger::{NullCommodityCatalog, MICROS_SCALE};
    use chrono::TimeZone;

    fn reconciler() -> CargoReconciler {
        CargoReconciler::new(
            Arc::new(NullMissionCatalog),
            Arc::new(NullCommodityCatalog),
            Arc::new(NullLedgerSink),
        )
    }

    fn t(s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 10, 2, 10, 31, s).unwrap()
    }

    fn ship_snapshot(s: u32, lines: Vec<CargoSnapshotLine>) -> TelemetryEvent {
        TelemetryEvent::new(
            t(s),
            EventKind::CargoSnapshot {
                vessel: Vehicle::Ship,
                cargo_carried: lines.iter().map(|l| l.count).sum(),
                inventory: Some(lines),
            },
        )
    }

    fn line(commodity_id: &str, count: u32, contract_id: Option<u64>) -> CargoSnapshotLine {
        CargoSnapshotLine {
            commodity_id: commodity_id.into(),
            count,
            stolen: 0,
            contract_id,
        }
    }

    fn srv_ctx() -> GameContext {
        GameContext {
            vehicle: Vehicle::Srv,
            ..GameContext::default()
        }
    }

    // --- Ordering gate ---

    #[test]
    fn out_of_order_event_is_ignored() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(10, vec![line("drones", 20, None)]), &ctx);
        engine.apply(&ship_snapshot(5, vec![line("drones", 99, None)]), &ctx);
        assert_eq!(engine.entry("drones").unwrap().owned, 20);
        assert_eq!(engine.last_applied(), Some(t(10)));
    }

    #[test]
    fn untracked_mission_accept_does_not_advance_the_gate() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &TelemetryEvent::new(
                t(10),
                EventKind::MissionAccepted {
                    contract_id: 1,
                    name: "Mission_Courier".into(),
                    commodity_id: None,
                    amount: None,
                    destination_system: None,
                    expiry: None,
                },
            ),
            &ctx,
        );
        assert_eq!(engine.last_applied(), None);
    }

    // --- Snapshot ---

    #[test]
    fn snapshot_tracks_cargo_carried_and_entries() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &ship_snapshot(1, vec![line("drones", 20, None), line("silver", 4, None)]),
            &ctx,
        );
        assert_eq!(engine.cargo_carried(), 24);
        assert_eq!(engine.snapshot().entries.len(), 2);

        engine.apply(&ship_snapshot(2, vec![line("drones", 10, None)]), &ctx);
        assert_eq!(engine.entry("drones").unwrap().owned, 10);
        assert!(engine.entry("silver").is_none());

        engine.apply(&ship_snapshot(3, vec![]), &ctx);
        assert!(engine.snapshot().entries.is_empty());
    }

    #[test]
    fn off_ship_snapshot_only_advances_the_gate() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(1, vec![line("drones", 20, None)]), &ctx);
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CargoSnapshot {
                    vessel: Vehicle::Srv,
                    cargo_carried: 0,
                    inventory: Some(vec![]),
                },
            ),
            &ctx,
        );
        assert_eq!(engine.entry("drones").unwrap().owned, 20);
        assert_eq!(engine.cargo_carried(), 20);
        assert_eq!(engine.last_applied(), Some(t(2)));
    }

    // --- Collect / eject off-ship gating ---

    #[test]
    fn on_ship_collection_defers_quantity_to_the_snapshot() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(1, vec![line("gold", 2, None)]), &ctx);
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CommodityCollected {
                    commodity_id: "gold".into(),
                    contract_id: None,
                    stolen: false,
                },
            ),
            &ctx,
        );
        assert_eq!(engine.entry("gold").unwrap().owned, 2);
    }

    #[test]
    fn off_ship_collection_adds_one_unit() {
        let engine = reconciler();
        engine.apply(
            &ship_snapshot(1, vec![line("gold", 2, None)]),
            &GameContext::default(),
        );
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CommodityCollected {
                    commodity_id: "gold".into(),
                    contract_id: None,
                    stolen: true,
                },
            ),
            &srv_ctx(),
        );
        let entry = engine.entry("gold").unwrap();
        assert_eq!(entry.owned, 2);
        assert_eq!(entry.stolen, 1);
    }

    #[test]
    fn ejecting_contracted_cargo_fails_the_delivery() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::MissionAccepted {
                    contract_id: 9,
                    name: "Mission_Delivery_Boom".into(),
                    commodity_id: Some("silver".into()),
                    amount: Some(30),
                    destination_system: None,
                    expiry: None,
                },
            ),
            &ctx,
        );
        engine.apply(&ship_snapshot(2, vec![line("silver", 30, Some(9))]), &ctx);
        engine.apply(
            &TelemetryEvent::new(
                t(3),
                EventKind::CommodityEjected {
                    commodity_id: "silver".into(),
                    amount: 2,
                    contract_id: Some(9),
                },
            ),
            &ctx,
        );
        let entry = engine.entry("silver").unwrap();
        assert_eq!(entry.contract(9).unwrap().status, HaulageStatus::Failed);
        // On-ship ejection leaves the counters to the next snapshot; need was
        // last computed while the contract was still open.
        assert_eq!(entry.contracted, 30);
        assert_eq!(entry.need, 30);
    }

    // --- Purchase / sale ---

    #[test]
    fn purchase_without_contract_is_owned_at_price() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::CommodityPurchased {
                    commodity_id: "silver".into(),
                    amount: 1,
                    price_micros: 127 * MICROS_SCALE,
                },
            ),
            &ctx,
        );
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CommodityPurchased {
                    commodity_id: "silver".into(),
                    amount: 5,
                    price_micros: MICROS_SCALE,
                },
            ),
            &ctx,
        );
        let entry = engine.entry("silver").unwrap();
        assert_eq!(entry.owned, 6);
        assert_eq!(entry.price(), 22);
    }

    #[test]
    fn purchase_against_collect_contract_is_contracted_with_source() {
        let engine = reconciler();
        let ctx = GameContext {
            system: Some("Shinrarta Dezhra".into()),
            station: Some("Jameson Memorial".into()),
            market_id: 128666762,
            ..GameContext::default()
        };
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::MissionAccepted {
                    contract_id: 5,
                    name: "Mission_Collect_Industrial".into(),
                    commodity_id: Some("gold".into()),
                    amount: Some(10),
                    destination_system: None,
                    expiry: None,
                },
            ),
            &ctx,
        );
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CommodityPurchased {
                    commodity_id: "gold".into(),
                    amount: 10,
                    price_micros: 9401 * MICROS_SCALE,
                },
            ),
            &ctx,
        );
        let entry = engine.entry("gold").unwrap();
        assert_eq!(entry.contracted, 10);
        assert_eq!(entry.owned, 0);
        let haulage = entry.contract(5).unwrap();
        assert_eq!(haulage.source_system.as_deref(), Some("Shinrarta Dezhra"));
        assert_eq!(haulage.source_body.as_deref(), Some("Jameson Memorial"));
        assert_eq!(haulage.end_market_id, 128666762);
    }

    #[test]
    fn sale_flags_the_shortfall_check_for_the_next_snapshot() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::MissionAccepted {
                    contract_id: 9,
                    name: "Mission_Delivery_Boom".into(),
                    commodity_id: Some("silver".into()),
                    amount: Some(30),
                    destination_system: None,
                    expiry: None,
                },
            ),
            &ctx,
        );
        engine.apply(&ship_snapshot(2, vec![line("silver", 30, Some(9))]), &ctx);
        engine.apply(
            &TelemetryEvent::new(
                t(3),
                EventKind::CommoditySold {
                    commodity_id: "silver".into(),
                    amount: 20,
                },
            ),
            &ctx,
        );
        engine.apply(&ship_snapshot(4, vec![line("silver", 10, Some(9))]), &ctx);
        let entry = engine.entry("silver").unwrap();
        assert_eq!(entry.contract(9).unwrap().status, HaulageStatus::Failed);
        assert_eq!(entry.contracted, 10);
        assert_eq!(entry.need, 0);
    }

    // --- Drones ---

    #[test]
    fn limpet_purchase_and_synthesis_add_owned_drones() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::LimpetPurchased {
                    amount: 10,
                    price_micros: 101 * MICROS_SCALE,
                },
            ),
            &ctx,
        );
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::Synthesised {
                    recipe: "Limpet Basic".into(),
                },
            ),
            &ctx,
        );
        let entry = engine.entry("drones").unwrap();
        assert_eq!(entry.owned, 14);
    }

    #[test]
    fn non_limpet_synthesis_is_ignored() {
        let engine = reconciler();
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::Synthesised {
                    recipe: "AFM Refill".into(),
                },
            ),
            &GameContext::default(),
        );
        assert!(engine.entry("drones").is_none());
    }

    // --- Mission lifecycle ---

    fn accept_salvage(engine: &CargoReconciler, s: u32) {
        engine.apply(
            &TelemetryEvent::new(
                t(s),
                EventKind::MissionAccepted {
                    contract_id: 413563829,
                    name: "Mission_Salvage_Planet".into(),
                    commodity_id: Some("structuralregulators".into()),
                    amount: Some(4),
                    destination_system: Some("Bunuson".into()),
                    expiry: None,
                },
            ),
            &GameContext::default(),
        );
    }

    #[test]
    fn accepted_salvage_mission_tracks_need_and_source() {
        let engine = reconciler();
        accept_salvage(&engine, 1);
        let entry = engine.entry("structuralregulators").unwrap();
        assert_eq!(entry.total(), 0);
        assert_eq!(entry.need, 4);
        let haulage = entry.contract(413563829).unwrap();
        assert_eq!(haulage.contract_type, Some(ContractType::Salvage));
        assert_eq!(haulage.source_system.as_deref(), Some("Bunuson"));
    }

    #[test]
    fn duplicate_accept_is_ignored() {
        let engine = reconciler();
        accept_salvage(&engine, 1);
        accept_salvage(&engine, 2);
        let entry = engine.entry("structuralregulators").unwrap();
        assert_eq!(entry.contracts.len(), 1);
        assert_eq!(entry.need, 4);
    }

    #[test]
    fn rank_delivery_accept_records_no_start_market() {
        let engine = reconciler();
        let ctx = GameContext {
            market_id: 3223343616,
            ..GameContext::default()
        };
        engine.apply(
            &TelemetryEvent::new(
                t(1),
                EventKind::MissionAccepted {
                    contract_id: 7,
                    name: "Mission_Delivery_RankFed".into(),
                    commodity_id: Some("silver".into()),
                    amount: Some(12),
                    destination_system: None,
                    expiry: None,
                },
            ),
            &ctx,
        );
        assert_eq!(engine.contract(7).unwrap().start_market_id, 0);
    }

    #[test]
    fn completed_mission_releases_the_entry() {
        let engine = reconciler();
        let ctx = GameContext::default();
        accept_salvage(&engine, 1);
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::MissionCompleted {
                    contract_id: 413563829,
                    commodity_id: Some("structuralregulators".into()),
                    has_commodity_rewards: false,
                },
            ),
            &ctx,
        );
        assert!(engine.entry("structuralregulators").is_none());
    }

    #[test]
    fn expired_mission_fails_and_zeroes_need() {
        let engine = reconciler();
        accept_salvage(&engine, 1);
        engine.apply(
            &TelemetryEvent::new(t(2), EventKind::MissionExpired { contract_id: 413563829 }),
            &GameContext::default(),
        );
        let entry = engine.entry("structuralregulators").unwrap();
        assert_eq!(
            entry.contract(413563829).unwrap().status,
            HaulageStatus::Failed
        );
        assert_eq!(entry.need, 0);
    }

    #[test]
    fn abandoned_mission_removes_the_contract_and_keeps_cargo() {
        let engine = reconciler();
        let ctx = GameContext::default();
        accept_salvage(&engine, 1);
        engine.apply(
            &ship_snapshot(2, vec![line("structuralregulators", 2, Some(413563829))]),
            &ctx,
        );
        engine.apply(
            &TelemetryEvent::new(t(3), EventKind::MissionAbandoned { contract_id: 413563829 }),
            &ctx,
        );
        let entry = engine.entry("structuralregulators").unwrap();
        assert!(entry.contract(413563829).is_none());
        assert_eq!(entry.contracted, 2);
        assert_eq!(entry.need, 0);
    }

    #[test]
    fn abandoned_mission_converts_onboard_cargo_to_stolen() {
        // Resume a contract whose outstanding quantity exceeds what the
        // player still owes: the difference is sitting in the hold.
        let mut entry = CargoEntry::new("silver");
        entry.add_quantity(CargoKind::Contracted, 4, 0);
        let mut haulage = Haulage::new(413563829, "Mission_Delivery_Boom", None, 6, None, false);
        haulage.remaining = 6;
        haulage.need = 2;
        entry.add_contract(haulage);
        let config = CargoHoldConfig {
            updated_at: Some(t(1)),
            cargo_carried: 4,
            entries: vec![entry],
        };
        let engine = CargoReconciler::from_config(
            config,
            Arc::new(NullMissionCatalog),
            Arc::new(NullCommodityCatalog),
            Arc::new(NullLedgerSink),
        );

        engine.apply(
            &TelemetryEvent::new(t(2), EventKind::MissionAbandoned { contract_id: 413563829 }),
            &GameContext::default(),
        );
        let entry = engine.entry("silver").unwrap();
        assert!(entry.contract(413563829).is_none());
        assert_eq!(entry.contracted, 0);
        assert_eq!(entry.stolen, 4);
        assert_eq!(entry.need, 0);
    }

    #[test]
    fn stray_contract_sweep_retires_emptied_entries() {
        let engine = reconciler();
        accept_salvage(&engine, 1);
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::Missions {
                    active_ids: vec![999],
                },
            ),
            &GameContext::default(),
        );
        assert!(engine.entry("structuralregulators").is_none());
    }

    // --- Death and engineering ---

    #[test]
    fn death_clears_the_ledger() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(1, vec![line("drones", 20, None)]), &ctx);
        engine.apply(&TelemetryEvent::new(t(2), EventKind::Died), &ctx);
        assert!(engine.snapshot().entries.is_empty());
    }

    #[test]
    fn engineer_contribution_consumes_owned_units() {
        let engine = reconciler();
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(1, vec![line("gold", 5, None)]), &ctx);
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::EngineerContributed {
                    commodity_id: Some("gold".into()),
                    amount: 8,
                },
            ),
            &ctx,
        );
        assert!(engine.entry("gold").is_none());
    }

    // --- Persistence boundary ---

    #[test]
    fn subscribers_observe_every_persisted_mutation() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let engine = reconciler();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        engine.subscribe(move |config| {
            assert!(config.updated_at.is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let ctx = GameContext::default();
        engine.apply(&ship_snapshot(1, vec![line("drones", 20, None)]), &ctx);
        // Stale event: no notification.
        engine.apply(&ship_snapshot(1, vec![line("drones", 99, None)]), &ctx);
        // Sale only flags the shortfall check: no notification.
        engine.apply(
            &TelemetryEvent::new(
                t(2),
                EventKind::CommoditySold {
                    commodity_id: "drones".into(),
                    amount: 1,
                },
            ),
            &ctx,
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn persisted_state_round_trips_through_from_config() {
        let engine = reconciler();
        let ctx = GameContext::default();
        accept_salvage(&engine, 1);
        engine.apply(
            &ship_snapshot(2, vec![line("structuralregulators", 2, Some(413563829))]),
            &ctx,
        );
        let config = engine.snapshot();

        let resumed = CargoReconciler::from_config(
            config,
            Arc::new(NullMissionCatalog),
            Arc::new(NullCommodityCatalog),
            Arc::new(NullLedgerSink),
        );
        assert_eq!(resumed.last_applied(), Some(t(2)));
        let entry = resumed.entry("structuralregulators").unwrap();
        assert_eq!(entry.contracted, 2);
        assert_eq!(entry.need, 4);
        // History before the stored high-water mark is rejected on resume.
        resumed.apply(&ship_snapshot(1, vec![]), &ctx);
        assert!(resumed.entry("structuralregulators").is_some());
    }
}
