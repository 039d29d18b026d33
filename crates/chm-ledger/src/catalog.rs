//! Commodity-definition lookup boundary.
//!
//! Purely informational: a missing definition degrades to the raw identifier
//! and never blocks or alters reconciliation.

/// Resolved display facts for a commodity identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommodityFacts {
    pub display_name: String,
    pub rare: bool,
}

/// External commodity-definition lookup.
pub trait CommodityCatalog: Send + Sync {
    fn definition(&self, commodity_id: &str) -> Option<CommodityFacts>;
}

/// Catalog that resolves nothing; entries fall back to their identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCommodityCatalog;

impl CommodityCatalog for NullCommodityCatalog {
    fn definition(&self, _commodity_id: &str) -> Option<CommodityFacts> {
        None
    }
}

impl crate::CargoEntry {
    /// Refresh the display fields from the catalog; falls back to the
    /// identifier when the commodity is unknown.
    pub fn resolve_definition(&mut self, catalog: &dyn CommodityCatalog) {
        match catalog.definition(&self.commodity_id) {
            Some(facts) => {
                self.display_name = facts.display_name;
                self.rare = facts.rare;
            }
            None => {
                self.display_name = self.commodity_id.clone();
                self.rare = false;
            }
        }
    }
}
