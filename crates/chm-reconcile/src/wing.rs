//! Depot progress and wing synchronization.
//!
//! # Purpose
//! Cargo-depot updates report multi-party contract progress: the player's own
//! collect/deliver transactions, and `WingUpdate` observations of a
//! wing-mate's transactions. This module applies all three steps to the
//! entry book and synthesizes the derived single-party event a wing
//! observation implies.
//!
//! # Invariants
//! - **Collect** moves `remaining` only; **Deliver** and **WingUpdate** move
//!   both `remaining` and `need` (a wing-mate's delivery reduces what the
//!   player still owes).
//! - Contracts first observed here are `shared`; a shared contract whose
//!   outstanding quantity reaches zero is removed outright (its entry retired
//!   if emptied), while a directly-accepted one is marked complete.
//! - Derived events are returned, never applied recursively.

use chm_haulage::{Haulage, MissionCatalog};
use chm_ledger::{CargoEntry, CommodityCatalog};
use chrono::{DateTime, Utc};

use crate::context::GameContext;
use crate::events::{CargoDepotUpdate, DepotUpdate, EventKind, TelemetryEvent};
use crate::inventory::{ensure_entry, entry_index_with_contract, rebind_commodity, retire_or_recompute};

/// Placeholder commodity for wing contracts observed before any depot names
/// the cargo; the first Collect/Deliver rebinds it.
const UNKNOWN_COMMODITY: &str = "unknown";

/// Apply one depot update. Returns the derived single-party event when a
/// wing-mate's progress was observed, stamped with `derived_stamp`.
pub(crate) fn apply_depot(
    entries: &mut Vec<CargoEntry>,
    update: &CargoDepotUpdate,
    ctx: &GameContext,
    missions: &dyn MissionCatalog,
    commodities: &dyn CommodityCatalog,
    derived_stamp: DateTime<Utc>,
) -> Option<TelemetryEvent> {
    match update.update {
        DepotUpdate::Collect => {
            apply_collect(entries, update, ctx, missions, commodities);
            None
        }
        DepotUpdate::Deliver => {
            apply_deliver(entries, update, ctx, missions, commodities);
            None
        }
        DepotUpdate::WingUpdate => {
            apply_wing_update(entries, update, missions, commodities, derived_stamp)
        }
    }
}

/// Fallback contract name when the mission catalog has no record: a zero
/// start market means the cargo was sourced in the field (collect side),
/// otherwise it was loaded at a market (delivery side).
fn fallback_name(missions: &dyn MissionCatalog, contract_id: u64, start_market_id: u64) -> String {
    match missions.mission(contract_id) {
        Some(facts) => facts.name,
        None if start_market_id == 0 => "MISSION_CollectWing".to_string(),
        None => "MISSION_DeliveryWing".to_string(),
    }
}

fn apply_collect(
    entries: &mut Vec<CargoEntry>,
    update: &CargoDepotUpdate,
    ctx: &GameContext,
    missions: &dyn MissionCatalog,
    commodities: &dyn CommodityCatalog,
) {
    let remaining = update.amount_remaining();
    let index = match entry_index_with_contract(entries, update.contract_id) {
        Some(index) => {
            // Contract known from an accept or a previous wing update.
            let entry = &mut entries[index];
            if let Some(haulage) = entry.contract_mut(update.contract_id) {
                haulage.remaining = remaining;
                haulage.origin_system = ctx.system.clone();
            }
            // A placeholder entry learns its real commodity here.
            if let Some(commodity_id) = &update.commodity_id {
                rebind_commodity(entry, commodity_id, commodities);
            }
            index
        }
        None => {
            // First exposure; quantities arrive with the following snapshot.
            let commodity_id = match &update.commodity_id {
                Some(commodity_id) => commodity_id,
                None => return,
            };
            let index = ensure_entry(entries, commodity_id, commodities);
            let name = match missions.mission(update.contract_id) {
                Some(facts) => facts.name,
                None => "MISSION_DeliveryWing".to_string(),
            };
            let haulage = Haulage::new(
                update.contract_id,
                name,
                ctx.system.clone(),
                remaining,
                None,
                true,
            );
            entries[index].add_contract(haulage);
            index
        }
    };
    if let Some(haulage) = entries[index].contract_mut(update.contract_id) {
        haulage.collected = update.collected;
        haulage.delivered = update.delivered;
        haulage.start_market_id = update.start_market_id;
        haulage.end_market_id = update.end_market_id;
    }
}

fn apply_deliver(
    entries: &mut Vec<CargoEntry>,
    update: &CargoDepotUpdate,
    ctx: &GameContext,
    missions: &dyn MissionCatalog,
    commodities: &dyn CommodityCatalog,
) {
    let remaining = update.amount_remaining();
    // Field-sourced contracts have no start market; only those carry an
    // origin at delivery time.
    let origin_system = if update.start_market_id == 0 {
        ctx.system.clone()
    } else {
        None
    };

    let index = match entry_index_with_contract(entries, update.contract_id) {
        Some(index) => {
            let entry = &mut entries[index];
            if let Some(haulage) = entry.contract_mut(update.contract_id) {
                haulage.remaining = remaining;
                haulage.need = remaining;
                haulage.amount = update.total_to_deliver;
                haulage.origin_system = origin_system;
            }
            if let Some(commodity_id) = &update.commodity_id {
                rebind_commodity(entry, commodity_id, commodities);
            }
            index
        }
        None => {
            // Cargo may have been instantiated by a market purchase instead.
            let commodity_id = match &update.commodity_id {
                Some(commodity_id) => commodity_id,
                None => return,
            };
            let index = ensure_entry(entries, commodity_id, commodities);
            let name = fallback_name(missions, update.contract_id, update.start_market_id);
            let haulage = Haulage::new(
                update.contract_id,
                name,
                origin_system,
                remaining,
                None,
                true,
            );
            entries[index].add_contract(haulage);
            index
        }
    };

    // Deliveries change what the player still owes; the snapshot handler does
    // not recompute need for collect-type contracts, so do it here.
    entries[index].calculate_need();
    if let Some(haulage) = entries[index].contract_mut(update.contract_id) {
        haulage.collected = update.collected;
        haulage.delivered = update.delivered;
        if haulage.end_market_id == 0 {
            haulage.end_market_id = update.end_market_id;
        }
    }
    finish_if_fulfilled(entries, index, update.contract_id, remaining);
}

fn apply_wing_update(
    entries: &mut Vec<CargoEntry>,
    update: &CargoDepotUpdate,
    missions: &dyn MissionCatalog,
    commodities: &dyn CommodityCatalog,
    derived_stamp: DateTime<Utc>,
) -> Option<TelemetryEvent> {
    let remaining = update.amount_remaining();
    let index = match entry_index_with_contract(entries, update.contract_id) {
        Some(index) => {
            if let Some(haulage) = entries[index].contract_mut(update.contract_id) {
                haulage.remaining = remaining;
                haulage.need = remaining;
            }
            index
        }
        None => {
            // First exposure through a wing-mate; commodity still unknown.
            let index = ensure_entry(entries, UNKNOWN_COMMODITY, commodities);
            let name = fallback_name(missions, update.contract_id, update.start_market_id);
            let haulage = Haulage::new(update.contract_id, name, None, remaining, None, true);
            entries[index].add_contract(haulage);
            index
        }
    };

    let mut derived = None;
    if let Some(haulage) = entries[index].contract(update.contract_id) {
        let collected_delta = update.collected.saturating_sub(haulage.collected);
        let delivered_delta = update.delivered.saturating_sub(haulage.delivered);
        let amount = collected_delta.max(delivered_delta);
        if amount > 0 {
            let step = if collected_delta > 0 {
                DepotUpdate::Collect
            } else {
                DepotUpdate::Deliver
            };
            derived = Some(TelemetryEvent::new(
                derived_stamp,
                EventKind::WingCargoDelta {
                    contract_id: update.contract_id,
                    step,
                    commodity_id: entries[index].commodity_id.clone(),
                    amount,
                    collected: update.collected,
                    delivered: update.delivered,
                    total_to_deliver: update.total_to_deliver,
                },
            ));
            let entry = &mut entries[index];
            if let Some(haulage) = entry.contract_mut(update.contract_id) {
                haulage.collected = update.collected;
                haulage.delivered = update.delivered;
                haulage.start_market_id = update.start_market_id;
                haulage.end_market_id = update.end_market_id;
            }
            if step == DepotUpdate::Deliver {
                entry.calculate_need();
            }
        }
    }
    finish_if_fulfilled(entries, index, update.contract_id, remaining);
    derived
}

/// Completion check shared by the deliver and wing arms: a fulfilled shared
/// contract is removed outright (retiring its entry when emptied); a
/// directly-accepted one is kept as a completion marker.
fn finish_if_fulfilled(
    entries: &mut Vec<CargoEntry>,
    index: usize,
    contract_id: u64,
    remaining: u32,
) {
    if remaining != 0 {
        return;
    }
    let shared = entries[index]
        .contract(contract_id)
        .map_or(false, |h| h.shared);
    if shared {
        entries[index].remove_contract(contract_id);
        retire_or_recompute(entries, index);
    } else if let Some(haulage) = entries[index].contract_mut(contract_id) {
        haulage.mark_complete();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
