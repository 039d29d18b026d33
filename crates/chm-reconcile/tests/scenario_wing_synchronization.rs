//! Scenario: Wing Synchronization
//!
//! # Invariants under test
//!
//! 1. A wing contract first observed through a wing-mate's progress is
//!    synthesized as `shared`, under a placeholder commodity when the cargo
//!    is not yet known.
//! 2. The player's first depot transaction rebinds the placeholder to the
//!    real commodity.
//! 3. A wing-mate's collection derives a Collect event; a wing-mate's
//!    delivery derives a Deliver event and reduces what the player owes.
//! 4. Derived events are returned from `apply`, stamped strictly after the
//!    triggering event, and re-dispatching them never double-applies.
//! 5. A fulfilled shared contract is removed outright and its entry retired.
//! 6. A delivery observed before the accept synthesizes a shared contract
//!    with the outstanding quantity.
//!
//! All tests are pure in-process; no files or network required.

use std::sync::Arc;

use chm_reconcile::{
    CargoDepotUpdate, CargoReconciler, DepotUpdate, EventKind, GameContext, NullCommodityCatalog,
    NullLedgerSink, NullMissionCatalog, TelemetryEvent,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CONTRACT: u64 = 413748339;

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

fn depot(
    s: u32,
    update: DepotUpdate,
    commodity_id: Option<&str>,
    collected: u32,
    delivered: u32,
    total: u32,
) -> TelemetryEvent {
    TelemetryEvent::new(
        t(s),
        EventKind::CargoDepot(CargoDepotUpdate {
            contract_id: CONTRACT,
            update,
            commodity_id: commodity_id.map(str::to_string),
            count: collected.max(delivered),
            start_market_id: 0,
            end_market_id: 3510023936,
            collected,
            delivered,
            total_to_deliver: total,
        }),
    )
}

// ---------------------------------------------------------------------------
// 1. First exposure through a wing-mate
// ---------------------------------------------------------------------------

#[test]
fn wing_update_synthesizes_a_shared_placeholder_contract() {
    let engine = reconciler();
    let ctx = GameContext::default();

    engine.apply(&depot(1, DepotUpdate::WingUpdate, None, 20, 0, 60), &ctx);

    let entry = engine.entry("unknown").expect("placeholder entry");
    let haulage = entry.contract(CONTRACT).unwrap();
    assert!(haulage.shared);
    assert_eq!(haulage.remaining, 60);
    assert_eq!(haulage.collected, 20);
}

// ---------------------------------------------------------------------------
// 2. Rebinding
// ---------------------------------------------------------------------------

#[test]
fn player_collect_rebinds_the_placeholder() {
    let engine = reconciler();
    let ctx = GameContext::default();

    engine.apply(&depot(1, DepotUpdate::WingUpdate, None, 20, 0, 60), &ctx);
    engine.apply(
        &depot(2, DepotUpdate::Collect, Some("tantalum"), 24, 0, 60),
        &ctx,
    );

    assert!(engine.entry("unknown").is_none());
    let entry = engine.entry("tantalum").expect("rebound entry");
    assert!(entry.contract(CONTRACT).is_some());
}

// ---------------------------------------------------------------------------
// 3. Derived events
// ---------------------------------------------------------------------------

#[test]
fn wing_collection_derives_a_collect_delta() {
    let engine = reconciler();
    let ctx = GameContext::default();

    let derived = engine.apply(
        &depot(1, DepotUpdate::WingUpdate, Some("tantalum"), 20, 0, 60),
        &ctx,
    );
    assert_eq!(derived.len(), 1);
    match &derived[0].kind {
        EventKind::WingCargoDelta { step, amount, .. } => {
            assert_eq!(*step, DepotUpdate::Collect);
            assert_eq!(*amount, 20);
        }
        other => panic!("expected WingCargoDelta, got {other:?}"),
    }
}

#[test]
fn wing_delivery_reduces_what_the_player_owes() {
    let engine = reconciler();
    let ctx = GameContext::default();

    engine.apply(&depot(1, DepotUpdate::Deliver, Some("tantalum"), 0, 4, 60), &ctx);
    let derived = engine.apply(
        &depot(2, DepotUpdate::WingUpdate, Some("tantalum"), 0, 44, 60),
        &ctx,
    );
    match &derived[0].kind {
        EventKind::WingCargoDelta { step, amount, .. } => {
            assert_eq!(*step, DepotUpdate::Deliver);
            assert_eq!(*amount, 40, "delta against the last recorded progress");
        }
        other => panic!("expected WingCargoDelta, got {other:?}"),
    }

    let entry = engine.entry("tantalum").unwrap();
    assert_eq!(entry.need, 16, "wing-mate deliveries reduce the player's need");
    let haulage = entry.contract(CONTRACT).unwrap();
    assert_eq!(haulage.remaining, 16);
    assert_eq!(haulage.need, 16);
}

// ---------------------------------------------------------------------------
// 4. Derived event plumbing
// ---------------------------------------------------------------------------

#[test]
fn derived_events_are_stamped_after_the_trigger_and_are_inert() {
    let engine = reconciler();
    let ctx = GameContext::default();

    let derived = engine.apply(
        &depot(1, DepotUpdate::WingUpdate, Some("tantalum"), 20, 0, 60),
        &ctx,
    );
    assert_eq!(derived[0].timestamp, t(1) + Duration::milliseconds(1));
    assert_eq!(engine.last_applied(), Some(derived[0].timestamp));

    let before = engine.snapshot();
    // Replaying the derived event must not move anything.
    engine.apply(&derived[0], &ctx);
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn unchanged_wing_progress_derives_nothing() {
    let engine = reconciler();
    let ctx = GameContext::default();

    engine.apply(&depot(1, DepotUpdate::WingUpdate, None, 20, 0, 60), &ctx);
    let derived = engine.apply(&depot(2, DepotUpdate::WingUpdate, None, 20, 0, 60), &ctx);
    assert!(derived.is_empty());
}

// ---------------------------------------------------------------------------
// 5. Shared completion
// ---------------------------------------------------------------------------

#[test]
fn fulfilled_shared_contract_is_removed_and_entry_retired() {
    let engine = reconciler();
    let ctx = GameContext::default();

    engine.apply(&depot(1, DepotUpdate::Deliver, Some("tantalum"), 0, 44, 60), &ctx);
    engine.apply(
        &depot(2, DepotUpdate::WingUpdate, Some("tantalum"), 0, 60, 60),
        &ctx,
    );
    assert!(
        engine.entry("tantalum").is_none(),
        "a fulfilled shared contract leaves no trace"
    );
}

// ---------------------------------------------------------------------------
// 6. Delivery before accept
// ---------------------------------------------------------------------------

#[test]
fn delivery_before_accept_synthesizes_outstanding_quantity() {
    let engine = reconciler();
    let ctx = GameContext {
        system: Some("Hyades Sector DR-V c2-23".into()),
        ..GameContext::default()
    };

    engine.apply(&depot(1, DepotUpdate::Deliver, Some("tantalum"), 0, 44, 60), &ctx);
    let entry = engine.entry("tantalum").unwrap();
    assert_eq!(entry.need, 16);
    let haulage = entry.contract(CONTRACT).unwrap();
    assert!(haulage.shared);
    assert_eq!(haulage.remaining, 16);
    assert_eq!(haulage.need, 16);
    assert_eq!(haulage.delivered, 44);
}
