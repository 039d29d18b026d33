//! chm-haulage
//!
//! Haulage contract model:
//! - Contract-type classification from raw contract names
//! - Explicit lifecycle state machine (Active -> Failed | Complete)
//! - Dual outstanding-quantity tracking (`remaining` vs `need`)
//!
//! Deterministic, pure logic. No IO.

mod catalog;
mod classify;
mod haulage;

pub use catalog::{MissionCatalog, MissionFacts, NullMissionCatalog};
pub use classify::{is_rank_mission, ContractType};
pub use haulage::{Haulage, HaulageStatus};
