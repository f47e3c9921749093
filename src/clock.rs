use chrono::{DateTime, Duration, Utc};

/// Single place the daemon reads wall-clock time. Countdown expiry decisions
/// must always compare against this, never against a client-reported timer.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn plus_minutes(t: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    t + Duration::minutes(minutes)
}

pub fn to_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
