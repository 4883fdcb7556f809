use chrono::Utc;

pub trait Clock {
    fn utc_now_iso8601(&self) -> String;
}

pub struct UtcClock;

impl Clock for UtcClock {
    fn utc_now_iso8601(&self) -> String {
        Utc::now().to_rfc3339()
    }
}
