//! Host keep-alive resources
//!
//! [`ResourceGuard`] wraps whatever "keep this process awake / networked"
//! primitive the host offers. Acquire is idempotent and always arms a safety
//! timer; release happens when the [`ResourceLease`] is dropped, on every
//! exit path of the polling loop.

use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Host keep-awake primitive
pub trait KeepAlive: Send + Sync {
    /// Take the resource; the host must drop it by itself after `timeout`
    fn hold(&self, timeout: Duration) -> io::Result<()>;

    fn unhold(&self);
}

/// No-op primitive for hosts without one
#[derive(Debug, Default)]
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn hold(&self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn unhold(&self) {}
}

/// `systemd-inhibit --what=sleep:idle ... sleep <timeout>`
///
/// The inhibitor lives as long as the child process; the child's own sleep
/// is the safety timeout if the release path never runs.
pub struct InhibitKeepAlive {
    who: String,
    why: String,
    child: Mutex<Option<tokio::process::Child>>,
}

impl InhibitKeepAlive {
    pub fn new(who: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            why: why.into(),
            child: Mutex::new(None),
        }
    }
}

impl KeepAlive for InhibitKeepAlive {
    fn hold(&self, timeout: Duration) -> io::Result<()> {
        let mut child = self.child.lock();
        if child.is_some() {
            return Ok(());
        }
        let spawned = tokio::process::Command::new("systemd-inhibit")
            .arg("--what=sleep:idle")
            .arg(format!("--who={}", self.who))
            .arg(format!("--why={}", self.why))
            .arg("--mode=block")
            .arg("sleep")
            .arg(timeout.as_secs().max(1).to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        *child = Some(spawned);
        Ok(())
    }

    fn unhold(&self) {
        if let Some(mut child) = self.child.lock().take()
            && let Err(e) = child.start_kill()
        {
            tracing::debug!(error = %e, "Inhibitor already gone");
        }
    }
}

#[derive(Default)]
struct GuardState {
    held: bool,
    timer: Option<CancellationToken>,
}

/// Scoped keep-alive around the scheduler's active lifetime
pub struct ResourceGuard {
    keepalive: Arc<dyn KeepAlive>,
    safety_timeout: Mutex<Duration>,
    state: Mutex<GuardState>,
}

impl ResourceGuard {
    pub fn new(keepalive: Arc<dyn KeepAlive>, safety_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            keepalive,
            safety_timeout: Mutex::new(safety_timeout),
            state: Mutex::new(GuardState::default()),
        })
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    pub fn safety_timeout(&self) -> Duration {
        *self.safety_timeout.lock()
    }

    /// Change the safety timeout; applies from the next acquire
    pub fn set_safety_timeout(&self, timeout: Duration) {
        *self.safety_timeout.lock() = timeout;
    }

    /// Take the resource; no-op if already held
    ///
    /// Must be called inside a tokio runtime (arms the safety timer).
    pub fn acquire(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.held {
            return;
        }

        let timeout = self.safety_timeout();
        if let Err(e) = self.keepalive.hold(timeout) {
            tracing::warn!(error = %e, "Keep-alive unavailable, continuing without it");
        }
        state.held = true;

        let token = CancellationToken::new();
        state.timer = Some(token.clone());
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(guard) = weak.upgrade() {
                        tracing::warn!(timeout_secs = timeout.as_secs(), "Keep-alive safety timeout reached, releasing");
                        guard.release();
                    }
                }
            }
        });
        tracing::debug!("Keep-alive acquired");
    }

    /// Give the resource back; no-op if not held
    pub fn release(&self) {
        let mut state = self.state.lock();
        if !state.held {
            return;
        }
        state.held = false;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        self.keepalive.unhold();
        tracing::debug!("Keep-alive released");
    }

    /// Acquire and return a lease that releases on drop
    pub fn lease(self: &Arc<Self>) -> ResourceLease {
        self.acquire();
        ResourceLease {
            guard: self.clone(),
        }
    }
}

/// Releases the [`ResourceGuard`] when dropped
pub struct ResourceLease {
    guard: Arc<ResourceGuard>,
}

impl ResourceLease {
    /// Re-take the resource if the safety timer released it
    pub fn refresh(&self) {
        self.guard.acquire();
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        self.guard.release();
    }
}
