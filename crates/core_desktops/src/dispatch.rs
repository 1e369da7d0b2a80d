//! Trigger dispatch and reentrancy suppression.
//!
//! Hosts emit change notifications as a side effect of the very mutations a pass
//! performs. [`PassLock`] is held for the duration of a pass; notification sources
//! check it and drop whatever arrives while it is held.

use crate::{run_pass, DesktopHost, HostError, ReconcileConfig, ReconcileReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Host change notifications that start a pass. None carries a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A window appeared.
    WindowAdded,
    /// A window went away.
    WindowRemoved,
    /// The user switched desktops.
    CurrentDesktopChanged,
    /// The desktop sequence changed.
    DesktopsChanged,
    /// A pass requested by the user (startup, IPC).
    Manual,
}

impl Trigger {
    /// The notifications a host delivers.
    pub const HOST_TRIGGERS: [Trigger; 4] = [
        Trigger::WindowAdded,
        Trigger::WindowRemoved,
        Trigger::CurrentDesktopChanged,
        Trigger::DesktopsChanged,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::WindowAdded => "window_added",
            Trigger::WindowRemoved => "window_removed",
            Trigger::CurrentDesktopChanged => "current_desktop_changed",
            Trigger::DesktopsChanged => "desktops_changed",
            Trigger::Manual => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared flag marking a pass in progress.
///
/// Clones share state, so a notification source on another thread can hold one.
#[derive(Debug, Clone, Default)]
pub struct PassLock {
    held: Arc<AtomicBool>,
    suppressed: Arc<AtomicU64>,
}

impl PassLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, or `None` if a pass is already running.
    pub fn try_acquire(&self) -> Option<PassGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                held: Arc::clone(&self.held),
            })
    }

    /// Check if a pass is running.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Decide whether a notification may start a pass.
    ///
    /// Returns false, and counts the drop, while a pass is running.
    pub fn admit(&self) -> bool {
        if self.is_held() {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            false
        } else {
            true
        }
    }

    /// Number of notifications dropped so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// Releases its [`PassLock`] when dropped, including during unwinding.
#[must_use = "the pass lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PassGuard {
    held: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Outcome of dispatching a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A pass was already running; the trigger was dropped.
    Suppressed,
    /// A pass ran to completion.
    Completed(ReconcileReport),
}

/// Runs one pass per trigger, never two at once.
#[derive(Debug, Default)]
pub struct Dispatcher {
    lock: PassLock,
    passes: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the lock, for notification sources.
    pub fn lock(&self) -> PassLock {
        self.lock.clone()
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Number of dropped notifications, including dispatches that found a pass running.
    pub fn suppressed(&self) -> u64 {
        self.lock.suppressed()
    }

    /// Run a pass under the lock.
    ///
    /// The lock is released on every exit path, whether the pass succeeds, fails
    /// or panics.
    pub fn dispatch<H: DesktopHost + ?Sized>(
        &self,
        host: &mut H,
        config: &ReconcileConfig,
    ) -> Result<Dispatch, HostError> {
        if !self.lock.admit() {
            return Ok(Dispatch::Suppressed);
        }
        let Some(_guard) = self.lock.try_acquire() else {
            return Ok(Dispatch::Suppressed);
        };

        let report = run_pass(host, config)?;
        self.passes.fetch_add(1, Ordering::Relaxed);
        Ok(Dispatch::Completed(report))
    }
}
