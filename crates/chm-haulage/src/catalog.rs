//! Mission-metadata lookup boundary.
//!
//! Consulted when a contract is first observed indirectly (snapshot line or
//! wing progress) rather than via an accept event. A missing record degrades
//! to placeholder values and never blocks reconciliation.

use chrono::{DateTime, Utc};

/// Metadata held by the mission-tracking subsystem for one contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissionFacts {
    pub name: String,
    pub origin_system: Option<String>,
    pub amount: Option<u32>,
    pub expiry: Option<DateTime<Utc>>,
}

/// External mission-metadata lookup.
pub trait MissionCatalog: Send + Sync {
    fn mission(&self, contract_id: u64) -> Option<MissionFacts>;
}

/// Catalog that knows no missions; synthesized contracts get placeholders.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMissionCatalog;

impl MissionCatalog for NullMissionCatalog {
    fn mission(&self, _contract_id: u64) -> Option<MissionFacts> {
        None
    }
}
