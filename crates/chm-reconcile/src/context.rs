//! Collaborator boundary: ambient game state and the persistence sink.
//!
//! The reconciler never reads globals. Every `apply` call receives an
//! explicit [`GameContext`] describing where the player is and what they are
//! flying; persistence goes through the [`LedgerSink`] trait so storage stays
//! outside the engine.

use chm_config::CargoHoldConfig;

use crate::events::Vehicle;

// ---------------------------------------------------------------------------
// GameContext
// ---------------------------------------------------------------------------

/// Read-only ambient state at the moment an event fires. Handlers use it to
/// stamp contract provenance (source system/body/station, start/end markets).
#[derive(Clone, Debug, PartialEq)]
pub struct GameContext {
    pub system: Option<String>,
    pub body: Option<String>,
    pub station: Option<String>,
    /// Market id of the current station; 0 when not docked.
    pub market_id: u64,
    pub vehicle: Vehicle,
}

impl Default for GameContext {
    fn default() -> Self {
        Self {
            system: None,
            body: None,
            station: None,
            market_id: 0,
            vehicle: Vehicle::Ship,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence boundary
// ---------------------------------------------------------------------------

/// Storage boundary. Called after every mutating event, outside the
/// inventory lock; implementations decide where and how the configuration is
/// written.
pub trait LedgerSink: Send + Sync {
    fn persist(&self, config: &CargoHoldConfig);
}

/// Sink that discards everything; for tests and read-only replays.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLedgerSink;

impl LedgerSink for NullLedgerSink {
    fn persist(&self, _config: &CargoHoldConfig) {}
}

/// Callback invoked with the post-mutation ledger state, outside the lock.
pub type InventorySubscriber = Box<dyn Fn(&CargoHoldConfig) + Send + Sync>;
