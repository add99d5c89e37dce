//! Handle to a held lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::backend::LockBackend;
use crate::error::{LockError, LockResult};

/// Where a handle is in its lifecycle. `Held` is the only state with a live
/// session behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Held,
    Released,
    Lost,
}

impl HandleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Held,
            1 => Self::Released,
            _ => Self::Lost,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Held => 0,
            Self::Released => 1,
            Self::Lost => 2,
        }
    }
}

/// State shared between the handle and its keepalive monitor.
struct Shared<B: LockBackend> {
    session: Mutex<Option<B::Session>>,
    state: AtomicU8,
    lost_sender: watch::Sender<bool>,
}

impl<B: LockBackend> Shared<B> {
    fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_released(&self) {
        // Lost wins over Released.
        let _ = self.state.compare_exchange(
            HandleState::Held.as_u8(),
            HandleState::Released.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn mark_lost(&self) {
        self.state.store(HandleState::Lost.as_u8(), Ordering::Release);
        self.lost_sender.send_replace(true);
    }
}

/// Handle to a held distributed lock.
///
/// The handle exclusively owns the session the lock was granted on. Dropping
/// it releases the lock; call [`release`](Self::release) explicitly to observe
/// errors.
///
/// # Example
///
/// ```rust,ignore
/// let mut handle = lock.acquire(Some(Duration::from_secs(5))).await?;
/// // Critical section - we hold the lock
/// do_work().await;
/// handle.release().await?;
/// ```
pub struct LockHandle<B: LockBackend> {
    name: String,
    key: B::Key,
    backend: Arc<B>,
    shared: Arc<Shared<B>>,
    lost_receiver: watch::Receiver<bool>,
    monitor: Option<JoinHandle<()>>,
}

impl<B: LockBackend> LockHandle<B> {
    /// Wraps a session that has just been granted `key`.
    ///
    /// Must be called from within a tokio runtime when `keepalive_cadence`
    /// is set.
    pub(crate) fn new(
        name: String,
        key: B::Key,
        backend: Arc<B>,
        session: B::Session,
        keepalive_cadence: Option<Duration>,
    ) -> Self {
        let (lost_sender, lost_receiver) = watch::channel(false);
        let shared = Arc::new(Shared {
            session: Mutex::new(Some(session)),
            state: AtomicU8::new(HandleState::Held.as_u8()),
            lost_sender,
        });

        let monitor = keepalive_cadence.map(|cadence| {
            tokio::spawn(keepalive(
                Arc::clone(&backend),
                Arc::clone(&shared),
                name.clone(),
                cadence,
            ))
        });

        Self {
            name,
            key,
            backend,
            shared,
            lost_receiver,
            monitor,
        }
    }

    /// Name of the lock this handle holds.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store-side key of the lock.
    pub fn key(&self) -> &B::Key {
        &self.key
    }

    pub fn state(&self) -> HandleState {
        self.shared.state()
    }

    /// True until the handle is released or its session is known to be dead.
    ///
    /// This reflects the last thing observed locally; use
    /// [`check`](Self::check) to ask the store.
    pub fn is_held(&self) -> bool {
        self.state() == HandleState::Held
    }

    /// Returns a receiver that flips to `true` when the lock is lost.
    ///
    /// Loss is detected by the keepalive monitor (see
    /// [`LockOptions::keepalive_cadence`](crate::LockOptions::keepalive_cadence))
    /// or by a failed [`check`](Self::check).
    ///
    /// ```rust,ignore
    /// let mut lost = handle.lost_token().clone();
    /// tokio::select! {
    ///     _ = lost.changed() => eprintln!("lock was lost"),
    ///     _ = do_work() => {}
    /// }
    /// ```
    pub fn lost_token(&self) -> &watch::Receiver<bool> {
        &self.lost_receiver
    }

    /// Probes the session behind the lock.
    ///
    /// Returns [`LockError::LockLost`] if the session has died, in which case
    /// the store may already have granted the lock to someone else and the
    /// caller must abandon its critical section. After a failed probe the
    /// handle stays lost.
    ///
    /// A handle that was released cleanly has nothing left to probe and
    /// returns `Ok(())`; use [`state`](Self::state) to tell it apart from a
    /// held one.
    #[instrument(skip(self), fields(lock.name = %self.name, backend = self.backend.kind()))]
    pub async fn check(&self) -> LockResult<()> {
        match self.state() {
            HandleState::Held => {}
            HandleState::Released => return Ok(()),
            HandleState::Lost => {
                return Err(LockError::LockLost(format!(
                    "session holding '{}' is gone",
                    self.name
                )));
            }
        }

        let mut slot = self.shared.session.lock().await;
        let Some(session) = slot.as_mut() else {
            return Err(LockError::LockLost(format!(
                "session holding '{}' is gone",
                self.name
            )));
        };

        let probe = self.backend.ping(session).await;
        if let Err(e) = probe {
            let dead = slot.take();
            drop(slot);
            self.shared.mark_lost();
            warn!(error = %e, "session probe failed, lock considered lost");
            if let Some(session) = dead {
                self.backend.close_session(session).await;
            }
            return Err(LockError::LockLost(e.to_string()));
        }
        Ok(())
    }

    /// Releases the lock and closes its session.
    ///
    /// Calling this again after a successful release is a no-op. If the
    /// session was found dead (now or earlier) the session is still torn
    /// down, and [`LockError::LockLost`] is returned so the caller knows its
    /// critical section may not have been exclusive.
    #[instrument(skip(self), fields(lock.name = %self.name, backend = self.backend.kind()))]
    pub async fn release(&mut self) -> LockResult<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }

        let session = self.shared.session.lock().await.take();
        let Some(mut session) = session else {
            return match self.state() {
                HandleState::Lost => Err(LockError::LockLost(format!(
                    "session holding '{}' was lost before release",
                    self.name
                ))),
                _ => Ok(()),
            };
        };

        let result = self.backend.release(&mut session, &self.key).await;
        self.backend.close_session(session).await;

        match result {
            Ok(()) => {
                self.shared.set_released();
                debug!("lock released");
                Ok(())
            }
            Err(e) => {
                self.shared.mark_lost();
                warn!(error = %e, "release failed, session closed");
                Err(LockError::LockLost(format!(
                    "release of '{}' failed: {}",
                    self.name, e
                )))
            }
        }
    }
}

impl<B: LockBackend> fmt::Debug for LockHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("backend", &self.backend.kind())
            .field("state", &self.state())
            .finish()
    }
}

impl<B: LockBackend> Drop for LockHandle<B> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        if self.state() != HandleState::Held {
            return;
        }

        let shared = Arc::clone(&self.shared);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let backend = Arc::clone(&self.backend);
                let key = self.key.clone();
                let name = std::mem::take(&mut self.name);
                runtime.spawn(async move {
                    let session = shared.session.lock().await.take();
                    if let Some(mut session) = session {
                        if let Err(e) = backend.release(&mut session, &key).await {
                            warn!(lock.name = %name, error = %e, "release on drop failed");
                        }
                        backend.close_session(session).await;
                        shared.set_released();
                    }
                });
            }
            Err(_) => {
                // No runtime to release on; ending the session makes the store drop the lock.
                if let Ok(mut slot) = shared.session.try_lock() {
                    drop(slot.take());
                }
                shared.set_released();
            }
        }
    }
}

/// Pings the session every `cadence` until it fails or the handle goes away.
async fn keepalive<B: LockBackend>(
    backend: Arc<B>,
    shared: Arc<Shared<B>>,
    name: String,
    cadence: Duration,
) {
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let mut slot = shared.session.lock().await;
        let Some(session) = slot.as_mut() else {
            break;
        };
        let probe = backend.ping(session).await;
        if let Err(e) = probe {
            let dead = slot.take();
            drop(slot);
            shared.mark_lost();
            warn!(lock.name = %name, error = %e, "keepalive failed, lock considered lost");
            if let Some(session) = dead {
                backend.close_session(session).await;
            }
            break;
        }
    }
}
