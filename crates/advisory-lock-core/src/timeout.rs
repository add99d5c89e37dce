//! Timeout value helpers.

use std::time::Duration;

/// Represents a timeout duration for lock operations.
///
/// - `Some(duration)` - Wait up to this duration
/// - `None` - Wait indefinitely
pub type Timeout = Option<Duration>;

/// Normalized wait bound handed to backends.
///
/// Zero means "try once", infinite means "wait until granted".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutValue {
    duration: Timeout,
}

impl TimeoutValue {
    pub const INFINITE: Self = Self { duration: None };
    pub const ZERO: Self = Self {
        duration: Some(Duration::ZERO),
    };

    pub fn is_infinite(&self) -> bool {
        self.duration.is_none()
    }

    pub fn is_zero(&self) -> bool {
        self.duration == Some(Duration::ZERO)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Whole milliseconds, rounded up so a wait never ends early. `None` when
    /// infinite. Saturates at `u64::MAX`.
    pub fn as_millis_ceil(&self) -> Option<u64> {
        self.duration.map(|d| {
            let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
            if d.subsec_nanos() % 1_000_000 != 0 {
                millis.saturating_add(1)
            } else {
                millis
            }
        })
    }

    /// Whole seconds, rounded up. `None` when infinite. Saturates at `u64::MAX`.
    pub fn as_secs_ceil(&self) -> Option<u64> {
        self.duration.map(|d| {
            if d.subsec_nanos() != 0 {
                d.as_secs().saturating_add(1)
            } else {
                d.as_secs()
            }
        })
    }

    /// The instant this wait ends if it starts at `start`. `None` when
    /// infinite or too far out to represent, which is waited on as infinite.
    pub fn deadline_from(&self, start: tokio::time::Instant) -> Option<tokio::time::Instant> {
        self.duration.and_then(|d| start.checked_add(d))
    }
}

impl From<Timeout> for TimeoutValue {
    fn from(timeout: Timeout) -> Self {
        Self { duration: timeout }
    }
}

impl From<Duration> for TimeoutValue {
    fn from(timeout: Duration) -> Self {
        Self {
            duration: Some(timeout),
        }
    }
}
