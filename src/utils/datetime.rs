//! Timestamp helpers shared by the store and the claim strategies

use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to microseconds.
///
/// Stored timestamps must survive a round trip unchanged on every backend;
/// PostgreSQL keeps microseconds and SQLite compares the text form.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Convert a std duration into a chrono duration, saturating on overflow
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
