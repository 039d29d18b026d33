//! chm-config
//!
//! Persisted representation of the cargo-hold ledger:
//! `{ updated_at, cargo_carried, entries[] }`, written after every mutating
//! event and read back at startup to seed the in-memory ledger.
//!
//! Seeding revalidates each entry's commodity definition through the
//! [`CommodityCatalog`] and recomputes `need` — neither is trusted from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chm_ledger::{CargoEntry, CommodityCatalog};

// ---------------------------------------------------------------------------
// CargoHoldConfig
// ---------------------------------------------------------------------------

/// The durable ledger snapshot handed to the storage collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CargoHoldConfig {
    /// High-water mark of the last applied event; seeds the ordering gate.
    pub updated_at: Option<DateTime<Utc>>,
    /// Last-known total carried-cargo count reported by the telemetry source.
    pub cargo_carried: u32,
    #[serde(default)]
    pub entries: Vec<CargoEntry>,
}

impl CargoHoldConfig {
    /// Rebuild the in-memory ledger from this configuration: refresh each
    /// entry's display fields from the catalog, recompute `need`, and order
    /// by display name.
    pub fn seed(mut self, catalog: &dyn CommodityCatalog) -> Vec<CargoEntry> {
        for entry in &mut self.entries {
            entry.resolve_definition(catalog);
            entry.calculate_need();
        }
        self.entries
            .sort_by(|a, b| a.display_name.cmp(&b.display_name));
        self.entries
    }
}

// ---------------------------------------------------------------------------
// JSON round-trip
// ---------------------------------------------------------------------------

/// Parse a configuration from its JSON form.
pub fn from_json(json: &str) -> Result<CargoHoldConfig> {
    serde_json::from_str(json).context("malformed cargo-hold configuration")
}

/// Serialize a configuration to pretty JSON.
pub fn to_json(config: &CargoHoldConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("serializing cargo-hold configuration")
}

/// Read a configuration from disk. A missing file yields the empty default;
/// an unreadable or malformed file is an error for the caller to surface.
pub fn load(path: &Path) -> Result<CargoHoldConfig> {
    if !path.exists() {
        return Ok(CargoHoldConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading cargo-hold configuration {}", path.display()))?;
    from_json(&raw)
}

/// Write a configuration to disk, replacing any previous contents.
pub fn save(path: &Path, config: &CargoHoldConfig) -> Result<()> {
    let json = to_json(config)?;
    fs::write(path, json)
        .with_context(|| format!("writing cargo-hold configuration {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
