use chrono::{DateTime, Duration, Utc};

/// Source of "now" for token expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Bearer token plus its expiry, owned by one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl ProxySession {
    /// True once less than `margin` remains before expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }
}
