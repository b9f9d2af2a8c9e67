use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::Instant;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn get_instant() -> Instant {
    Instant::now()
}

/// Sentinel expiry of a token that was never fetched. Always in the past.
pub fn never() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// std -> chrono, saturating instead of failing on absurdly large values
pub fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}
