//! Event ordering gate.
//!
//! # Purpose
//!
//! Journal replays and duplicate feeds can present events the engine has
//! already applied. This module tracks the timestamp of the last applied
//! event and rejects anything at or before it.
//!
//! # Invariants
//!
//! - **Strictly increasing**: an event is accepted only if its timestamp is
//!   strictly greater than the last applied timestamp.
//! - **Gate advances only on acceptance**: rejections do not move it.
//! - **Pure, no IO**: the caller provides the timestamp and decides what to
//!   do with the result.

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Freshness decision
// ---------------------------------------------------------------------------

/// Result of checking an event timestamp against the ordering gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFreshness {
    /// Timestamp is strictly after the last applied event.
    Fresh,
    /// Timestamp is at or before the last applied event.
    ///
    /// Fields carry the gate value and the rejected timestamp for logging.
    Stale {
        last_applied: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

impl EventFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, EventFreshness::Fresh)
    }

    pub fn is_stale(&self) -> bool {
        !self.is_fresh()
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Tracks the last applied event timestamp to enforce monotonic ordering.
///
/// Start from [`UpdateGate::new`] (accepts any event) or
/// [`UpdateGate::seeded`] when resuming from a persisted ledger. Call
/// [`accept`][UpdateGate::accept] on each incoming event; apply the event
/// only if the result is [`EventFreshness::Fresh`].
///
/// Use [`check`][UpdateGate::check] for a read-only probe that does **not**
/// advance the gate.
#[derive(Clone, Debug, Default)]
pub struct UpdateGate {
    last_applied: Option<DateTime<Utc>>,
}

impl UpdateGate {
    /// A gate in its initial state: the first event is always fresh.
    pub fn new() -> Self {
        Self { last_applied: None }
    }

    /// A gate resumed from a persisted high-water mark.
    pub fn seeded(last_applied: Option<DateTime<Utc>>) -> Self {
        Self { last_applied }
    }

    /// Check freshness **without** advancing the gate.
    pub fn check(&self, at: DateTime<Utc>) -> EventFreshness {
        match self.last_applied {
            Some(last) if at <= last => EventFreshness::Stale {
                last_applied: last,
                got: at,
            },
            _ => EventFreshness::Fresh,
        }
    }

    /// Check freshness **and advance the gate** if the event is fresh.
    pub fn accept(&mut self, at: DateTime<Utc>) -> EventFreshness {
        let result = self.check(at);
        if result.is_fresh() {
            self.last_applied = Some(at);
        }
        result
    }

    /// Timestamp of the last applied event, if any.
    pub fn last_applied(&self) -> Option<DateTime<Utc>> {
        self.last_applied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
