//! Snapshot merge — reconcile the ledger against an authoritative hold
//! manifest.
//!
//! # Purpose
//! The snapshot is the ground truth for quantities. Merging:
//! 1. removes **strays** — entries absent from the manifest lose their
//!    counters; they survive (zeroed) only while contracts are pending;
//! 2. groups manifest lines by commodity and **skips** groups whose stored
//!    totals, stolen count and contract count already match (average price
//!    and contract state are preserved);
//! 3. **rebuilds** mismatched entries: counters from the lines, missing
//!    contracts synthesized from the mission catalog (placeholder
//!    `Mission_None` when unknown);
//! 4. consumes the pending **shortfall check**: after a sale, a delivery-like
//!    contract whose `need` exceeds the observed contracted count has had its
//!    cargo sold out from under it and is marked failed.
//!
//! # Invariants
//! - Deterministic, pure with respect to the catalogs. No IO.
//! - Quantity conservation: after a rebuild,
//!   `owned + stolen + contracted == Σ line counts` for every group.
//! - The merge never touches a contract's `remaining`/`need` quantities; only
//!   depot and mission events move those.

use chm_haulage::{Haulage, MissionCatalog};
use chm_ledger::{CargoEntry, CommodityCatalog};

use crate::events::CargoSnapshotLine;
use crate::inventory::{ensure_entry, entry_index};

/// Merge a ship cargo manifest into the entry book.
pub(crate) fn merge_snapshot(
    entries: &mut Vec<CargoEntry>,
    lines: &[CargoSnapshotLine],
    check_haulage: bool,
    missions: &dyn MissionCatalog,
    commodities: &dyn CommodityCatalog,
) {
    // Stray pass: entries with no manifest line left the hold.
    let mut i = 0;
    while i < entries.len() {
        let present = lines
            .iter()
            .any(|l| entries[i].is_commodity(&l.commodity_id));
        if present {
            i += 1;
            continue;
        }
        if entries[i].contracts.is_empty() {
            entries.remove(i);
        } else {
            let entry = &mut entries[i];
            entry.owned = 0;
            entry.stolen = 0;
            entry.contracted = 0;
            entry.calculate_need();
            i += 1;
        }
    }

    // One group per commodity, in first-seen manifest order.
    let mut seen: Vec<&str> = Vec::new();
    for line in lines {
        if seen
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&line.commodity_id))
        {
            continue;
        }
        seen.push(&line.commodity_id);
        let group: Vec<&CargoSnapshotLine> = lines
            .iter()
            .filter(|l| l.commodity_id.eq_ignore_ascii_case(&line.commodity_id))
            .collect();

        let index = match entry_index(entries, &line.commodity_id) {
            Some(index) => {
                if group_matches(&entries[index], &group) {
                    continue;
                }
                index
            }
            None => ensure_entry(entries, &line.commodity_id, commodities),
        };
        rebuild_entry(&mut entries[index], &group, check_haulage, missions);
    }
}

/// A group matches when the stored totals and contract count agree with the
/// manifest; matching entries keep their price and contract state untouched.
fn group_matches(entry: &CargoEntry, group: &[&CargoSnapshotLine]) -> bool {
    let total: u32 = group.iter().map(|l| l.count).sum();
    let stolen: u32 = group
        .iter()
        .filter(|l| l.contract_id.is_none())
        .map(|l| l.stolen)
        .sum();
    let contract_lines = group.iter().filter(|l| l.contract_id.is_some()).count();
    entry.total() == total && entry.stolen == stolen && entry.contracts.len() == contract_lines
}

fn rebuild_entry(
    entry: &mut CargoEntry,
    group: &[&CargoSnapshotLine],
    check_haulage: bool,
    missions: &dyn MissionCatalog,
) {
    let total: u32 = group.iter().map(|l| l.count).sum();
    entry.contracted = group
        .iter()
        .filter(|l| l.contract_id.is_some())
        .map(|l| l.count)
        .sum();
    entry.stolen = group
        .iter()
        .filter(|l| l.contract_id.is_none())
        .map(|l| l.stolen)
        .sum();
    entry.owned = total.saturating_sub(entry.contracted + entry.stolen);

    for line in group {
        let contract_id = match line.contract_id {
            Some(id) => id,
            None => continue,
        };
        match entry.contract_mut(contract_id) {
            Some(haulage) => {
                // Shortfall check: a sale flagged this merge; a delivery
                // contract holding less than it still needs lost its cargo.
                if check_haulage && haulage.need > line.count && haulage.is_delivery_like() {
                    haulage.mark_failed();
                }
            }
            None => {
                // Contract observed for the first time through the manifest.
                let haulage = match missions.mission(contract_id) {
                    Some(facts) => Haulage::new(
                        contract_id,
                        facts.name,
                        facts.origin_system,
                        facts.amount.unwrap_or(line.count),
                        facts.expiry,
                        false,
                    ),
                    None => Haulage::new(contract_id, "Mission_None", None, line.count, None, false),
                };
                entry.add_contract(haulage);
            }
        }
    }
    entry.calculate_need();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
