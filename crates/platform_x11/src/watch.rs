//! Root window property watcher.
//!
//! Runs on its own connection and thread so it never interleaves with requests
//! made by a pass.

use crate::{Atoms, X11Error};
use dyndesk_core::{PassLock, Trigger};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stops the watcher thread when dropped.
pub struct EventWatchHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for EventWatchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Map a change of `_NET_CLIENT_LIST` onto triggers.
pub fn classify_client_list_change(old: &HashSet<Window>, new: &HashSet<Window>) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    if new.difference(old).next().is_some() {
        triggers.push(Trigger::WindowAdded);
    }
    if old.difference(new).next().is_some() {
        triggers.push(Trigger::WindowRemoved);
    }
    triggers
}

/// Start watching the root window for desktop and client list changes.
///
/// Triggers observed while `lock` is held are dropped, since they are echoes
/// of the running pass.
///
/// Suppression is best-effort on X11. The window manager applies a pass's
/// client messages after the pass returns, so most echoes arrive once the lock
/// is free and start another pass. That pass finds nothing to change because
/// the desktop targets it sent were absolute.
pub fn install_event_watch(
    lock: PassLock,
) -> Result<(EventWatchHandle, mpsc::Receiver<Trigger>), X11Error> {
    let (conn, screen_num) = x11rb::connect(None)?;
    let root = conn
        .setup()
        .roots
        .get(screen_num)
        .map(|screen| screen.root)
        .ok_or(X11Error::NoScreen(screen_num))?;
    let atoms = Atoms::new(&conn)?.reply()?;

    conn.change_window_attributes(
        root,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
    )?
    .check()?;

    let mut watcher = Watcher {
        known_clients: HashSet::new(),
        conn,
        root,
        atoms,
        lock,
    };
    watcher.known_clients = watcher.client_list()?;

    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("x11-watch".to_string())
            .spawn(move || watcher.run(&stop, &tx))?
    };

    debug!("Watching root window {:#x} for property changes", root);
    Ok((
        EventWatchHandle {
            stop,
            thread: Some(thread),
        },
        rx,
    ))
}

struct Watcher {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    lock: PassLock,
    known_clients: HashSet<Window>,
}

impl Watcher {
    fn client_list(&self) -> Result<HashSet<Window>, X11Error> {
        let reply = self
            .conn
            .get_property(false, self.root, self.atoms._NET_CLIENT_LIST, AtomEnum::ANY, 0, u32::MAX)?
            .reply()?;
        Ok(reply.value32().map(|values| values.collect()).unwrap_or_default())
    }

    fn run(mut self, stop: &AtomicBool, tx: &mpsc::Sender<Trigger>) {
        while !stop.load(Ordering::Acquire) {
            let event = match self.conn.poll_for_event() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    std::thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    warn!("X11 event watcher stopped: {}", e);
                    return;
                }
            };

            let Event::PropertyNotify(notify) = event else {
                continue;
            };
            if notify.window != self.root {
                continue;
            }

            let triggers = match self.triggers_for(notify.atom) {
                Ok(triggers) => triggers,
                Err(e) => {
                    warn!("Failed to read changed property: {}", e);
                    continue;
                }
            };

            for trigger in triggers {
                if !self.lock.admit() {
                    trace!("Dropped {} during pass", trigger);
                    continue;
                }
                if tx.send(trigger).is_err() {
                    debug!("Trigger receiver closed, stopping watcher");
                    return;
                }
            }
        }
    }

    fn triggers_for(&mut self, atom: u32) -> Result<Vec<Trigger>, X11Error> {
        if atom == self.atoms._NET_CLIENT_LIST {
            let clients = self.client_list()?;
            let triggers = classify_client_list_change(&self.known_clients, &clients);
            self.known_clients = clients;
            Ok(triggers)
        } else if atom == self.atoms._NET_CURRENT_DESKTOP {
            Ok(vec![Trigger::CurrentDesktopChanged])
        } else if atom == self.atoms._NET_NUMBER_OF_DESKTOPS {
            Ok(vec![Trigger::DesktopsChanged])
        } else {
            Ok(Vec::new())
        }
    }
}
