//! In-memory desktop host.

use crate::{DesktopHost, DesktopIndex, HostError, Trigger, WindowId, WindowInfo};
use std::fmt;

type Listener = Box<dyn FnMut(Trigger) + Send>;

/// A desktop host kept entirely in memory.
///
/// Behaves like a window manager: removing or inserting a desktop renumbers window
/// memberships and the current view, and every change notifies subscribers
/// synchronously, before the mutating call returns.
pub struct MemoryHost {
    labels: Vec<String>,
    windows: Vec<WindowInfo>,
    current: DesktopIndex,
    listeners: Vec<Listener>,
}

impl MemoryHost {
    /// Create a host with `desktop_count` desktops (at least one), viewing desktop 1.
    pub fn new(desktop_count: usize) -> Self {
        Self {
            labels: (1..=desktop_count.max(1))
                .map(|i| format!("Desktop {}", i))
                .collect(),
            windows: Vec::new(),
            current: 1,
            listeners: Vec::new(),
        }
    }

    /// Register a listener for change notifications.
    pub fn subscribe(&mut self, listener: impl FnMut(Trigger) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Add a window. Memberships are not checked against the desktop count.
    pub fn add_window(&mut self, window: WindowInfo) {
        self.windows.push(window);
        self.emit(Trigger::WindowAdded);
    }

    /// Remove a window by id.
    pub fn remove_window(&mut self, id: WindowId) -> Option<WindowInfo> {
        let pos = self.windows.iter().position(|w| w.id == id)?;
        let window = self.windows.remove(pos);
        self.emit(Trigger::WindowRemoved);
        Some(window)
    }

    /// Get a window by id.
    pub fn window(&self, id: WindowId) -> Option<&WindowInfo> {
        self.windows.iter().find(|w| w.id == id)
    }

    /// Switch the current view.
    pub fn set_current_desktop(&mut self, index: DesktopIndex) -> Result<(), HostError> {
        self.check_index(index)?;
        if self.current != index {
            self.current = index;
            self.emit(Trigger::CurrentDesktopChanged);
        }
        Ok(())
    }

    fn check_index(&self, index: DesktopIndex) -> Result<(), HostError> {
        if index == 0 || index > self.labels.len() {
            return Err(HostError::DesktopOutOfRange {
                index,
                count: self.labels.len(),
            });
        }
        Ok(())
    }

    fn emit(&mut self, trigger: Trigger) {
        for listener in &mut self.listeners {
            listener(trigger);
        }
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("labels", &self.labels)
            .field("windows", &self.windows)
            .field("current", &self.current)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// New position of desktop `desktop` after the desktop at `removed` goes away.
/// Occupants of the removed desktop move to its left neighbour.
fn shift_after_removal(desktop: DesktopIndex, removed: DesktopIndex) -> DesktopIndex {
    if desktop > removed {
        desktop - 1
    } else if desktop == removed {
        removed.saturating_sub(1).max(1)
    } else {
        desktop
    }
}

impl DesktopHost for MemoryHost {
    fn windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        Ok(self.windows.clone())
    }

    fn current_desktop(&self) -> Result<DesktopIndex, HostError> {
        Ok(self.current)
    }

    fn desktop_count(&self) -> Result<usize, HostError> {
        Ok(self.labels.len())
    }

    fn desktop_labels(&self) -> Result<Vec<String>, HostError> {
        Ok(self.labels.clone())
    }

    fn create_desktop(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        if index == 0 || index > self.labels.len() + 1 {
            return Err(HostError::DesktopOutOfRange {
                index,
                count: self.labels.len(),
            });
        }

        self.labels.insert(index - 1, label.to_string());
        for window in &mut self.windows {
            for desktop in &mut window.desktops {
                if *desktop >= index {
                    *desktop += 1;
                }
            }
        }

        let view_moved = self.current >= index;
        if view_moved {
            self.current += 1;
        }

        self.emit(Trigger::DesktopsChanged);
        if view_moved {
            self.emit(Trigger::CurrentDesktopChanged);
        }
        Ok(())
    }

    fn remove_desktop(&mut self, index: DesktopIndex) -> Result<(), HostError> {
        self.check_index(index)?;
        if self.labels.len() == 1 {
            return Err(HostError::Request("cannot remove the last desktop".to_string()));
        }

        self.labels.remove(index - 1);
        for window in &mut self.windows {
            for desktop in &mut window.desktops {
                *desktop = shift_after_removal(*desktop, index);
            }
            window.desktops.sort_unstable();
            window.desktops.dedup();
        }

        let previous = self.current;
        self.current = shift_after_removal(self.current, index);

        self.emit(Trigger::DesktopsChanged);
        if self.current != previous {
            self.emit(Trigger::CurrentDesktopChanged);
        }
        Ok(())
    }

    fn set_desktop_label(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        self.check_index(index)?;
        self.labels[index - 1] = label.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_new_host_has_at_least_one_desktop() {
        let host = MemoryHost::new(0);
        assert_eq!(host.desktop_count().unwrap(), 1);
        assert_eq!(host.current_desktop().unwrap(), 1);
    }

    #[test]
    fn test_remove_desktop_renumbers_windows_and_view() {
        let mut host = MemoryHost::new(4);
        host.add_window(WindowInfo::new(1, [3]));
        host.add_window(WindowInfo::new(2, [1, 4]));
        host.set_current_desktop(4).unwrap();

        host.remove_desktop(2).unwrap();

        assert_eq!(host.desktop_count().unwrap(), 3);
        assert_eq!(host.window(1).unwrap().desktops, vec![2]);
        assert_eq!(host.window(2).unwrap().desktops, vec![1, 3]);
        assert_eq!(host.current_desktop().unwrap(), 3);
        assert_eq!(
            host.desktop_labels().unwrap(),
            vec!["Desktop 1", "Desktop 3", "Desktop 4"]
        );
    }

    #[test]
    fn test_occupants_of_removed_desktop_move_left() {
        let mut host = MemoryHost::new(3);
        host.add_window(WindowInfo::new(1, [2]).skipping_pager());
        host.add_window(WindowInfo::new(2, [1]).skipping_pager());

        host.remove_desktop(2).unwrap();
        assert_eq!(host.window(1).unwrap().desktops, vec![1]);

        host.remove_desktop(1).unwrap();
        assert_eq!(host.window(2).unwrap().desktops, vec![1]);
    }

    #[test]
    fn test_cannot_remove_last_desktop() {
        let mut host = MemoryHost::new(1);
        assert!(host.remove_desktop(1).is_err());
        assert!(host.remove_desktop(2).is_err());
    }

    #[test]
    fn test_create_desktop_appends_and_inserts() {
        let mut host = MemoryHost::new(2);
        host.add_window(WindowInfo::new(1, [2]));
        host.set_current_desktop(2).unwrap();

        host.create_desktop(3, "new").unwrap();
        assert_eq!(host.desktop_labels().unwrap()[2], "new");
        assert_eq!(host.current_desktop().unwrap(), 2);

        host.create_desktop(1, "front").unwrap();
        assert_eq!(host.desktop_count().unwrap(), 4);
        assert_eq!(host.window(1).unwrap().desktops, vec![3]);
        assert_eq!(host.current_desktop().unwrap(), 3);

        assert!(host.create_desktop(6, "gap").is_err());
    }

    #[test]
    fn test_listeners_receive_notifications() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut host = MemoryHost::new(2);
        {
            let seen = Arc::clone(&seen);
            host.subscribe(move |t| seen.lock().unwrap().push(t));
        }

        host.add_window(WindowInfo::new(7, [1]));
        host.set_current_desktop(2).unwrap();
        host.set_current_desktop(2).unwrap();
        host.remove_window(7);
        host.remove_desktop(1).unwrap();
        host.set_desktop_label(1, "renamed").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Trigger::WindowAdded,
                Trigger::CurrentDesktopChanged,
                Trigger::WindowRemoved,
                Trigger::DesktopsChanged,
                Trigger::CurrentDesktopChanged,
            ]
        );
    }
}
