//! Protocol parameters.
//!
//! All percentages are applied with integer floor division against the total
//! (stake or reconstruction units) and compared inclusively.

/// Wire protocol version carried by encoded messages.
pub const PROTOCOL_VERSION: u16 = 1;

/// Stake share required to finalize in round 1.
pub const FAST_QUORUM_PCT: u64 = 80;

/// Stake share required to finalize in round 2.
pub const FALLBACK_QUORUM_PCT: u64 = 60;

/// Stake share required to skip a slot.
pub const SKIP_QUORUM_PCT: u64 = 60;

/// Share of a block's reconstruction units a validator must hold to treat the
/// block as received.
pub const RECONSTRUCTION_PCT: u64 = 80;

/// Largest adversarial stake share the safety argument tolerates (exclusive).
pub const MAX_BYZANTINE_PCT: u64 = 20;

/// Offline stake share tolerated on top of the adversarial share.
pub const MAX_OFFLINE_PCT: u64 = 20;

/// `max(1, floor(total * pct / 100))`.
///
/// The clamp keeps an empty set from ever meeting a threshold when the total
/// is too small for the percentage to round up to one.
pub fn percent_threshold(total: u64, pct: u64) -> u64 {
    let raw = (u128::from(total) * u128::from(pct) / 100) as u64;
    raw.max(1)
}
