//! The seam between the reconciler and a window manager.

use crate::{DesktopIndex, WindowInfo};
use thiserror::Error;

/// Errors reported by a desktop host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Desktop index {index} is out of range (count: {count})")]
    DesktopOutOfRange { index: DesktopIndex, count: usize },

    #[error("Window manager connection lost: {0}")]
    Disconnected(String),

    #[error("Window manager request failed: {0}")]
    Request(String),
}

/// A window manager exposing an ordered, 1-based desktop sequence.
///
/// Hosts own all window and desktop state. The reconciler only reads windows and
/// mutates the desktop sequence through this trait. Removing or inserting a desktop
/// renumbers every desktop after it, and window memberships follow.
pub trait DesktopHost {
    /// Snapshot host state at the start of a pass.
    fn refresh(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    /// All managed windows with their eligibility and desktop memberships.
    fn windows(&self) -> Result<Vec<WindowInfo>, HostError>;

    /// The desktop currently being viewed.
    fn current_desktop(&self) -> Result<DesktopIndex, HostError>;

    /// Number of desktops in the sequence.
    fn desktop_count(&self) -> Result<usize, HostError>;

    /// Labels of all desktops, in index order.
    fn desktop_labels(&self) -> Result<Vec<String>, HostError>;

    /// Insert a desktop so that it ends up at `index` (`1..=count + 1`).
    fn create_desktop(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError>;

    /// Remove the desktop at `index`; later desktops shift down by one.
    fn remove_desktop(&mut self, index: DesktopIndex) -> Result<(), HostError>;

    /// Set the label of the desktop at `index`.
    fn set_desktop_label(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError>;

    /// Commit buffered mutations at the end of a pass.
    fn flush(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

impl<H: DesktopHost + ?Sized> DesktopHost for Box<H> {
    fn refresh(&mut self) -> Result<(), HostError> {
        (**self).refresh()
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        (**self).windows()
    }

    fn current_desktop(&self) -> Result<DesktopIndex, HostError> {
        (**self).current_desktop()
    }

    fn desktop_count(&self) -> Result<usize, HostError> {
        (**self).desktop_count()
    }

    fn desktop_labels(&self) -> Result<Vec<String>, HostError> {
        (**self).desktop_labels()
    }

    fn create_desktop(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        (**self).create_desktop(index, label)
    }

    fn remove_desktop(&mut self, index: DesktopIndex) -> Result<(), HostError> {
        (**self).remove_desktop(index)
    }

    fn set_desktop_label(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        (**self).set_desktop_label(index, label)
    }

    fn flush(&mut self) -> Result<(), HostError> {
        (**self).flush()
    }
}
