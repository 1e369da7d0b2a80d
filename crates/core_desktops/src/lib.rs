//! dyndesk Core
//!
//! Platform-agnostic dynamic desktop reconciliation.
//!
//! This crate keeps a linear, 1-based sequence of virtual desktops in step with usage:
//! - Empty desktops sitting between occupied ones are removed
//! - One spare desktop follows the last occupied one, and at least `minimum_desktops` exist
//! - The desktop the user is looking at is never removed
//! - Every desktop is relabeled from a template on each pass
//!
//! The window manager is reached through the [`DesktopHost`] trait. [`MemoryHost`] is an
//! in-memory implementation used for tests and dry runs.

mod dispatch;
mod host;
mod label;
mod memory;
mod occupancy;
mod reconcile;

pub use dispatch::{Dispatch, Dispatcher, PassGuard, PassLock, Trigger};
pub use host::{DesktopHost, HostError};
pub use label::{LabelTemplate, DEFAULT_LABEL_TEMPLATE, INDEX_PLACEHOLDER};
pub use memory::MemoryHost;
pub use occupancy::{occupied_desktops, Occupancy};
pub use reconcile::{
    apply_plan, plan_pass, reconcile, run_pass, ReconcileConfig, ReconcilePlan, ReconcileReport,
    DEFAULT_MINIMUM_DESKTOPS, PROVISIONAL_LABEL,
};

use serde::{Deserialize, Serialize};

/// Unique identifier for a window.
/// On X11 this is the client window XID.
pub type WindowId = u64;

/// 1-based position of a desktop in the desktop sequence.
pub type DesktopIndex = usize;

/// A window as seen by the occupancy scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// The window identifier.
    pub id: WindowId,
    /// Whether the window asked to be left out of pagers.
    /// Such windows never count towards occupancy.
    pub skip_pager: bool,
    /// Desktops the window is shown on. Empty for windows on all desktops.
    pub desktops: Vec<DesktopIndex>,
}

impl WindowInfo {
    /// Create an eligible window on the given desktops.
    pub fn new(id: WindowId, desktops: impl IntoIterator<Item = DesktopIndex>) -> Self {
        Self {
            id,
            skip_pager: false,
            desktops: desktops.into_iter().collect(),
        }
    }

    /// Mark the window as skipped by pagers.
    pub fn skipping_pager(mut self) -> Self {
        self.skip_pager = true;
        self
    }

    /// Check if the window counts towards occupancy.
    pub fn is_eligible(&self) -> bool {
        !self.skip_pager
    }
}
