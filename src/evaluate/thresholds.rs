//! Tier arithmetic and crossing decisions.
//!
//! This is the heart of the notification dedup logic: given the tier an
//! entity currently occupies and the tier it was last notified for, decide
//! whether to notify, do nothing, or re-arm the hysteresis.
//!
//! # Tier
//!
//! An entity's tier is the largest configured threshold its usage percentage
//! has reached or exceeded. Sitting exactly on a threshold counts as having
//! reached it: 75% usage against thresholds [75, 90] occupies tier 75. Usage
//! below the smallest threshold occupies no tier at all.
//!
//! # Hysteresis contract
//!
//! The ledger stores the tier of the last notification per (entity,
//! filesystem). The rules, in terms of the total order `None < Some(t)`:
//!
//! 1. observed tier above the stored tier: a new crossing. Notify, then
//!    advance the ledger.
//! 2. observed tier equal to the stored tier: already notified, do nothing.
//! 3. observed tier below the stored tier: rewrite the ledger to the
//!    *observed* tier (possibly none), without notifying. The ledger never
//!    holds a tier higher than what is currently observed, so a later climb
//!    re-triggers.
//!
//! Rule 3 is authoritative for every kind of drop, including a drop between
//! two non-adjacent tiers that never passed below the lowest threshold.

/// The largest threshold less than or equal to the usage percentage, or
/// `None` when usage is below the smallest threshold.
///
/// `thresholds` must be sorted ascending; configuration validation enforces
/// strictly increasing values before a run starts.
pub fn current_tier(percent: u8, thresholds: &[u8]) -> Option<u8> {
    thresholds
        .iter()
        .copied()
        .take_while(|threshold| *threshold <= percent)
        .last()
}

/// Outcome of comparing an observed tier against the last-notified tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDecision {
    /// A new crossing: notify, then advance the ledger to this tier.
    Notify { tier: u8 },
    /// Nothing changed since the last notification (or the entity has never
    /// occupied a tier). No ledger traffic.
    Unchanged,
    /// Observed tier dropped below the last-notified tier: rewrite the
    /// ledger to the observed tier (`None` clears the entry) and stay quiet.
    Reset { to: Option<u8> },
}

/// Decide what to do for one (entity, filesystem) pair this run.
pub fn evaluate(current: Option<u8>, last_notified: Option<u8>) -> CrossingDecision {
    match (current, last_notified) {
        (Some(tier), None) => CrossingDecision::Notify { tier },
        (Some(tier), Some(last)) if tier > last => CrossingDecision::Notify { tier },
        (current, last) if current == last => CrossingDecision::Unchanged,
        (current, _) => CrossingDecision::Reset { to: current },
    }
}
