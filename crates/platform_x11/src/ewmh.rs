//! EWMH atoms and property encodings.

use dyndesk_core::DesktopIndex;

// Interned atoms used by the host and the event watcher.
x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_CLIENT_LIST,
        _NET_CURRENT_DESKTOP,
        _NET_NUMBER_OF_DESKTOPS,
        _NET_DESKTOP_NAMES,
        _NET_WM_DESKTOP,
        _NET_WM_STATE,
        _NET_WM_STATE_SKIP_PAGER,
        UTF8_STRING,
    }
}

/// `_NET_WM_DESKTOP` value of a window shown on every desktop.
pub const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;

/// Map a raw `_NET_WM_DESKTOP` value to 1-based desktop membership.
///
/// Sticky windows belong to no particular desktop and keep none alive.
pub fn membership(desktop: Option<u32>) -> Vec<DesktopIndex> {
    match desktop {
        Some(ALL_DESKTOPS) | None => Vec::new(),
        Some(d) => vec![d as DesktopIndex + 1],
    }
}

/// 0-based desktop of a window after the desktop `removed` goes away.
/// Occupants of the removed desktop move to its left neighbour.
pub fn desktop_after_removal(desktop: u32, removed: u32) -> u32 {
    if desktop > removed {
        desktop - 1
    } else if desktop == removed {
        removed.saturating_sub(1)
    } else {
        desktop
    }
}

/// 0-based desktop of a window after a desktop is inserted at `inserted`.
pub fn desktop_after_insert(desktop: u32, inserted: u32) -> u32 {
    if desktop >= inserted {
        desktop + 1
    } else {
        desktop
    }
}

/// Decode `_NET_DESKTOP_NAMES`: NUL-terminated UTF-8 strings.
pub fn decode_desktop_names(data: &[u8]) -> Vec<String> {
    let data = data.strip_suffix(&[0]).unwrap_or(data);
    if data.is_empty() {
        return Vec::new();
    }
    data.split(|&b| b == 0)
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

/// Encode names for `_NET_DESKTOP_NAMES`.
pub fn encode_desktop_names<S: AsRef<str>>(names: &[S]) -> Vec<u8> {
    let mut data = Vec::new();
    for name in names {
        data.extend_from_slice(name.as_ref().as_bytes());
        data.push(0);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_names() {
        assert_eq!(
            decode_desktop_names(b"Desktop 1\0Desktop 2\0"),
            vec!["Desktop 1", "Desktop 2"]
        );
        // Some window managers omit the final terminator.
        assert_eq!(decode_desktop_names(b"one\0two"), vec!["one", "two"]);
        assert!(decode_desktop_names(b"").is_empty());
    }

    #[test]
    fn test_decode_keeps_empty_names() {
        assert_eq!(decode_desktop_names(b"\0\0web\0"), vec!["", "", "web"]);
    }

    #[test]
    fn test_encode_names() {
        assert_eq!(encode_desktop_names(&["a", "bc"]), b"a\0bc\0".to_vec());
        assert!(encode_desktop_names::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_desktop_after_removal() {
        assert_eq!(desktop_after_removal(0, 1), 0);
        assert_eq!(desktop_after_removal(1, 1), 0);
        assert_eq!(desktop_after_removal(3, 1), 2);
        // Removing the first desktop keeps its occupants on the new first desktop.
        assert_eq!(desktop_after_removal(0, 0), 0);
    }

    #[test]
    fn test_desktop_after_insert() {
        assert_eq!(desktop_after_insert(0, 1), 0);
        assert_eq!(desktop_after_insert(1, 1), 2);
        assert_eq!(desktop_after_insert(4, 0), 5);
    }

    #[test]
    fn test_membership() {
        assert_eq!(membership(Some(0)), vec![1]);
        assert_eq!(membership(Some(3)), vec![4]);
        assert!(membership(Some(ALL_DESKTOPS)).is_empty());
        assert!(membership(None).is_empty());
    }
}
