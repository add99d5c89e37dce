//! Per-lock tuning shared by every backend.

use std::time::Duration;

/// Default slack granted to the store beyond the requested wait bound.
pub const DEFAULT_STORE_GRACE: Duration = Duration::from_secs(5);

/// Options applied to every acquisition made through a
/// [`DistributedLock`](crate::DistributedLock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Cadence of the background liveness probe on held sessions.
    ///
    /// `None` disables the probe; loss is then only noticed by
    /// [`LockHandle::check`](crate::LockHandle::check) or on release.
    pub keepalive_cadence: Option<Duration>,

    /// How long past the requested timeout the client waits for the store to
    /// answer before abandoning the session.
    pub store_grace: Duration,
}

impl LockOptions {
    pub fn new() -> Self {
        Self {
            keepalive_cadence: None,
            store_grace: DEFAULT_STORE_GRACE,
        }
    }

    pub fn keepalive_cadence(mut self, cadence: Duration) -> Self {
        self.keepalive_cadence = Some(cadence);
        self
    }

    pub fn store_grace(mut self, grace: Duration) -> Self {
        self.store_grace = grace;
        self
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::new()
    }
}
