//! dyndesk Platform X11
//!
//! Desktop management for EWMH-compliant X11 window managers.
//!
//! This crate handles:
//! - Reading client windows, their desktops and `_NET_WM_STATE_SKIP_PAGER`
//! - Removing and inserting desktops through EWMH client messages
//! - Writing `_NET_DESKTOP_NAMES`
//! - Watching root window properties for changes
//!
//! EWMH only lets a pager change the desktop *count*, which grows or shrinks the
//! sequence at its end. Removing a desktop in the middle is emulated by moving every
//! window after it one desktop to the left first, then shrinking the count.

mod ewmh;
mod watch;

pub use ewmh::{
    decode_desktop_names, desktop_after_insert, desktop_after_removal, encode_desktop_names,
    membership, Atoms, ALL_DESKTOPS,
};
pub use watch::{classify_client_list_change, install_event_watch, EventWatchHandle};

use dyndesk_core::{DesktopHost, DesktopIndex, HostError, WindowInfo};
use thiserror::Error;
use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ClientMessageEvent, ConnectionExt as _, EventMask, PropMode, Window};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::CURRENT_TIME;

/// Source indication for client messages: we act as a pager.
const SOURCE_PAGER: u32 = 2;

/// Errors that can occur talking to the X server.
#[derive(Debug, Error)]
pub enum X11Error {
    #[error("Failed to connect to X server: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    #[error("X11 connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X11 request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("Screen {0} does not exist")]
    NoScreen(usize),

    #[error("Window manager does not publish {0}")]
    MissingProperty(&'static str),

    #[error("Failed to spawn event watcher: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<X11Error> for HostError {
    fn from(err: X11Error) -> Self {
        match err {
            X11Error::Connect(_) | X11Error::Connection(_) => HostError::Disconnected(err.to_string()),
            _ => HostError::Request(err.to_string()),
        }
    }
}

/// A managed client window as last read from the server.
#[derive(Debug, Clone)]
struct Client {
    window: Window,
    skip_pager: bool,
    /// Raw `_NET_WM_DESKTOP` value (0-based, or [`ALL_DESKTOPS`]).
    desktop: Option<u32>,
}

/// Host state snapshotted by [`DesktopHost::refresh`] and kept in step with our own
/// requests, since the window manager applies them asynchronously.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    clients: Vec<Client>,
    desktop_count: usize,
    names: Vec<String>,
    /// 0-based current desktop.
    current: u32,
    names_dirty: bool,
}

/// A [`DesktopHost`] backed by an X11 connection.
pub struct X11Host {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    state: Snapshot,
}

impl X11Host {
    /// Connect to the display named by `$DISPLAY` and take an initial snapshot.
    pub fn connect() -> Result<Self, X11Error> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or(X11Error::NoScreen(screen_num))?;
        let atoms = Atoms::new(&conn)?.reply()?;

        let mut host = Self {
            conn,
            root,
            atoms,
            state: Snapshot::default(),
        };
        host.snapshot()?;
        debug!(
            "Connected to X server: {} desktops, {} clients",
            host.state.desktop_count,
            host.state.clients.len()
        );
        Ok(host)
    }

    fn get_u32s(&self, window: Window, property: Atom) -> Result<Option<Vec<u32>>, X11Error> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX)?
            .reply()?;
        Ok(reply.value32().map(|values| values.collect()))
    }

    fn get_u32(&self, window: Window, property: Atom) -> Result<Option<u32>, X11Error> {
        Ok(self
            .get_u32s(window, property)?
            .and_then(|values| values.first().copied()))
    }

    fn read_client(&self, window: Window) -> Result<Client, X11Error> {
        let states = self
            .get_u32s(window, self.atoms._NET_WM_STATE)?
            .unwrap_or_default();
        Ok(Client {
            window,
            skip_pager: states.contains(&self.atoms._NET_WM_STATE_SKIP_PAGER),
            desktop: self.get_u32(window, self.atoms._NET_WM_DESKTOP)?,
        })
    }

    fn snapshot(&mut self) -> Result<(), X11Error> {
        let windows = self
            .get_u32s(self.root, self.atoms._NET_CLIENT_LIST)?
            .unwrap_or_default();
        let mut clients = Vec::with_capacity(windows.len());
        for window in windows {
            match self.read_client(window) {
                Ok(client) => clients.push(client),
                // The window may have been destroyed since the client list was read.
                Err(X11Error::Reply(e)) => trace!("Skipping client {:#x}: {}", window, e),
                Err(e) => return Err(e),
            }
        }

        let desktop_count = self
            .get_u32(self.root, self.atoms._NET_NUMBER_OF_DESKTOPS)?
            .ok_or(X11Error::MissingProperty("_NET_NUMBER_OF_DESKTOPS"))?
            as usize;
        let current = self
            .get_u32(self.root, self.atoms._NET_CURRENT_DESKTOP)?
            .unwrap_or(0);
        let names = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_DESKTOP_NAMES,
                self.atoms.UTF8_STRING,
                0,
                u32::MAX,
            )?
            .reply()?;

        self.state = Snapshot {
            clients,
            desktop_count,
            names: decode_desktop_names(&names.value),
            current,
            names_dirty: false,
        };
        Ok(())
    }

    fn send_message(&self, window: Window, message_type: Atom, data: [u32; 5]) -> Result<(), X11Error> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        Ok(())
    }

    fn request_desktop_count(&self, count: usize) -> Result<(), X11Error> {
        self.send_message(
            self.root,
            self.atoms._NET_NUMBER_OF_DESKTOPS,
            [count as u32, 0, 0, 0, 0],
        )
    }

    /// Move every client and the current view according to `shift` (0-based).
    fn move_all(&mut self, shift: impl Fn(u32) -> u32) -> Result<(), X11Error> {
        for i in 0..self.state.clients.len() {
            let client = &self.state.clients[i];
            let Some(desktop) = client.desktop.filter(|&d| d != ALL_DESKTOPS) else {
                continue;
            };
            let target = shift(desktop);
            if target != desktop {
                self.send_message(
                    client.window,
                    self.atoms._NET_WM_DESKTOP,
                    [target, SOURCE_PAGER, 0, 0, 0],
                )?;
                self.state.clients[i].desktop = Some(target);
            }
        }

        let target = shift(self.state.current);
        if target != self.state.current {
            self.send_message(
                self.root,
                self.atoms._NET_CURRENT_DESKTOP,
                [target, CURRENT_TIME, 0, 0, 0],
            )?;
            self.state.current = target;
        }
        Ok(())
    }

    fn check_index(&self, index: DesktopIndex) -> Result<(), HostError> {
        if index == 0 || index > self.state.desktop_count {
            return Err(HostError::DesktopOutOfRange {
                index,
                count: self.state.desktop_count,
            });
        }
        Ok(())
    }

    fn padded_names(&mut self) -> &mut Vec<String> {
        let count = self.state.desktop_count;
        if self.state.names.len() < count {
            self.state.names.resize(count, String::new());
        }
        &mut self.state.names
    }
}

impl DesktopHost for X11Host {
    fn refresh(&mut self) -> Result<(), HostError> {
        Ok(self.snapshot()?)
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        Ok(self
            .state
            .clients
            .iter()
            .map(|client| WindowInfo {
                id: u64::from(client.window),
                skip_pager: client.skip_pager,
                desktops: membership(client.desktop),
            })
            .collect())
    }

    fn current_desktop(&self) -> Result<DesktopIndex, HostError> {
        Ok(self.state.current as DesktopIndex + 1)
    }

    fn desktop_count(&self) -> Result<usize, HostError> {
        Ok(self.state.desktop_count)
    }

    fn desktop_labels(&self) -> Result<Vec<String>, HostError> {
        let mut labels = self.state.names.clone();
        labels.resize(self.state.desktop_count, String::new());
        Ok(labels)
    }

    fn create_desktop(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        let count = self.state.desktop_count;
        if index == 0 || index > count + 1 {
            return Err(HostError::DesktopOutOfRange { index, count });
        }

        // Grow first so the windows we shift right have somewhere to go.
        self.request_desktop_count(count + 1)?;
        let inserted = (index - 1) as u32;
        self.move_all(|d| desktop_after_insert(d, inserted))?;

        self.padded_names().insert(index - 1, label.to_string());
        self.state.desktop_count = count + 1;
        self.state.names_dirty = true;
        debug!("Inserted desktop at {}", index);
        Ok(())
    }

    fn remove_desktop(&mut self, index: DesktopIndex) -> Result<(), HostError> {
        self.check_index(index)?;
        let count = self.state.desktop_count;
        if count == 1 {
            return Err(HostError::Request("cannot remove the last desktop".to_string()));
        }

        // Empty the desktop and close the gap, then drop the (now unused) last desktop.
        let removed = (index - 1) as u32;
        self.move_all(|d| desktop_after_removal(d, removed))?;
        self.request_desktop_count(count - 1)?;

        let names = self.padded_names();
        names.remove(index - 1);
        self.state.desktop_count = count - 1;
        self.state.names_dirty = true;
        debug!("Removed desktop {}", index);
        Ok(())
    }

    fn set_desktop_label(&mut self, index: DesktopIndex, label: &str) -> Result<(), HostError> {
        self.check_index(index)?;
        let names = self.padded_names();
        if names[index - 1] != label {
            names[index - 1] = label.to_string();
            self.state.names_dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HostError> {
        if self.state.names_dirty {
            let count = self.state.desktop_count;
            let data = encode_desktop_names(&self.state.names[..count.min(self.state.names.len())]);
            self.conn
                .change_property8(
                    PropMode::REPLACE,
                    self.root,
                    self.atoms._NET_DESKTOP_NAMES,
                    self.atoms.UTF8_STRING,
                    &data,
                )
                .map_err(X11Error::from)?;
            self.state.names_dirty = false;
            trace!("Wrote {} desktop names", count);
        }
        self.conn.flush().map_err(X11Error::from)?;
        Ok(())
    }
}
