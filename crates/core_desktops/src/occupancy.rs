//! Occupancy scanning: which desktops hold at least one eligible window.

use crate::{DesktopHost, DesktopIndex, HostError, WindowInfo};
use std::collections::BTreeSet;

/// Collect every desktop index referenced by an eligible window.
///
/// Windows skipped by pagers are ignored. An empty result is a normal state.
pub fn occupied_desktops<'a, I>(windows: I) -> BTreeSet<DesktopIndex>
where
    I: IntoIterator<Item = &'a WindowInfo>,
{
    windows
        .into_iter()
        .filter(|w| w.is_eligible())
        .flat_map(|w| w.desktops.iter().copied())
        .collect()
}

/// Result of one occupancy scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    /// Desktops holding at least one eligible window.
    pub occupied: BTreeSet<DesktopIndex>,
    /// The desktop being viewed.
    pub current: DesktopIndex,
}

impl Occupancy {
    /// Create an occupancy from explicit values.
    pub fn new(occupied: impl IntoIterator<Item = DesktopIndex>, current: DesktopIndex) -> Self {
        Self {
            occupied: occupied.into_iter().collect(),
            current,
        }
    }

    /// Scan the host's windows and current view.
    pub fn scan<H: DesktopHost + ?Sized>(host: &H) -> Result<Self, HostError> {
        let windows = host.windows()?;
        Ok(Self {
            occupied: occupied_desktops(&windows),
            current: host.current_desktop()?,
        })
    }

    /// Highest occupied index, or 0 when nothing is occupied.
    pub fn max_occupied(&self) -> DesktopIndex {
        self.occupied.last().copied().unwrap_or(0)
    }

    /// Check if a desktop must survive gap removal.
    pub fn is_protected(&self, index: DesktopIndex) -> bool {
        index == self.current || self.occupied.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_windows_is_empty() {
        let windows: Vec<WindowInfo> = Vec::new();
        assert!(occupied_desktops(&windows).is_empty());
    }

    #[test]
    fn test_skip_pager_windows_are_ignored() {
        let windows = vec![
            WindowInfo::new(1, [1]),
            WindowInfo::new(2, [4]).skipping_pager(),
        ];
        let occupied = occupied_desktops(&windows);
        assert_eq!(occupied.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_multi_desktop_windows_occupy_all_memberships() {
        let windows = vec![WindowInfo::new(1, [2, 5]), WindowInfo::new(2, [2])];
        let occupied = occupied_desktops(&windows);
        assert_eq!(occupied.into_iter().collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn test_windows_without_membership_occupy_nothing() {
        let windows = vec![WindowInfo::new(1, [])];
        assert!(occupied_desktops(&windows).is_empty());
    }

    #[test]
    fn test_max_occupied_of_empty_set_is_zero() {
        let occupancy = Occupancy::new([], 2);
        assert_eq!(occupancy.max_occupied(), 0);
        assert!(occupancy.is_protected(2));
        assert!(!occupancy.is_protected(1));
    }

    #[test]
    fn test_scan_reads_host() {
        let mut host = crate::MemoryHost::new(3);
        host.add_window(WindowInfo::new(1, [3]));
        host.set_current_desktop(2).unwrap();

        let occupancy = Occupancy::scan(&host).unwrap();
        assert_eq!(occupancy.current, 2);
        assert_eq!(occupancy.max_occupied(), 3);
    }
}
