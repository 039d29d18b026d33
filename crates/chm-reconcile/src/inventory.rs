//! Shared inventory-book operations used by the event handlers.
//!
//! The engine holds the entry list as a plain `Vec<CargoEntry>`; ordering by
//! display name is applied at the query/persistence boundary, not maintained
//! per mutation.

use chm_ledger::{CargoEntry, CommodityCatalog};

/// Index of the entry tracking `commodity_id`, if any.
pub(crate) fn entry_index(entries: &[CargoEntry], commodity_id: &str) -> Option<usize> {
    entries.iter().position(|e| e.is_commodity(commodity_id))
}

/// Index of the entry holding a contract with the given id, if any.
pub(crate) fn entry_index_with_contract(entries: &[CargoEntry], contract_id: u64) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.contract(contract_id).is_some())
}

/// Find or lazily create the entry for `commodity_id`; returns its index.
pub(crate) fn ensure_entry(
    entries: &mut Vec<CargoEntry>,
    commodity_id: &str,
    catalog: &dyn CommodityCatalog,
) -> usize {
    if let Some(index) = entry_index(entries, commodity_id) {
        return index;
    }
    let mut entry = CargoEntry::new(commodity_id);
    entry.resolve_definition(catalog);
    entries.push(entry);
    entries.len() - 1
}

/// Apply the retirement rule after a potentially-zeroing mutation: an emptied
/// entry with no contracts leaves the book; otherwise its `need` is
/// recomputed.
pub(crate) fn retire_or_recompute(entries: &mut Vec<CargoEntry>, index: usize) {
    if entries[index].should_retire() {
        entries.remove(index);
    } else {
        entries[index].calculate_need();
    }
}

/// Re-key an entry that was synthesized under a placeholder identifier once
/// the real commodity is known.
pub(crate) fn rebind_commodity(
    entry: &mut CargoEntry,
    commodity_id: &str,
    catalog: &dyn CommodityCatalog,
) {
    if !entry.is_commodity(commodity_id) {
        entry.commodity_id = commodity_id.to_string();
    }
    entry.resolve_definition(catalog);
}
