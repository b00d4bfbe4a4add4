//! Threaded coordinator host

use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use log::{debug, info, warn};

use super::common::{Control, CoordinatorCore};
use super::CoordinatorOptions;
use crate::connection::sync::Endpoint;
use crate::connection::LinkEvent;
use crate::domain::{Badge, Settings, StoreState, TabId};
use crate::Error;

/// A coordinator running on its own thread.
///
/// Dropping the handle shuts the coordinator down.
#[derive(Debug)]
pub struct Coordinator {
    control: Sender<Control>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Restores persisted state, binds to `endpoint` and starts processing events.
    pub fn start(endpoint: &Endpoint, options: CoordinatorOptions) -> Result<Coordinator, Error> {
        let links = endpoint.bind()?;
        let core = CoordinatorCore::start(&options);
        let (control, controls) = channel::unbounded();

        let handle = thread::Builder::new()
            .name(String::from("gqlmock-coordinator"))
            .spawn(move || run(core, links, controls, options.idle_timeout))?;
        info!("coordinator started");

        Ok(Coordinator {
            control,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Signals that a tab closed: its store and routes are dropped and sessions re-persisted.
    pub fn tab_closed(&self, tab_id: TabId) -> Result<(), Error> {
        self.send(Control::TabClosed(tab_id))
    }

    /// Current state of a tab's store, `None` if the tab has no store.
    pub fn state(&self, tab_id: TabId) -> Result<Option<StoreState>, Error> {
        self.inspect(move |core| core.state(tab_id))
    }

    pub fn badge(&self, tab_id: TabId) -> Result<Badge, Error> {
        self.inspect(move |core| core.badge(tab_id))
    }

    /// Tabs that currently own a store.
    pub fn tabs(&self) -> Result<Vec<TabId>, Error> {
        self.inspect(|core| core.tabs())
    }

    pub fn settings(&self) -> Result<Settings, Error> {
        self.inspect(|core| core.settings())
    }

    /// True while the event loop runs. Turns false after shutdown or idle suspension.
    pub fn is_running(&self) -> bool {
        match self.handle.lock() {
            Ok(handle) => handle.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(_) => false,
        }
    }

    /// Stops the event loop and waits for it to finish. Clients see their connections drop.
    pub fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
        self.join();
    }

    /// Waits until the event loop stops, by shutdown or idle suspension.
    pub fn join(&self) {
        let handle = match self.handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("coordinator thread panicked");
            }
        }
    }

    fn inspect<T, F>(&self, inspect: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&CoordinatorCore) -> T + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(1);
        self.send(Control::Inspect(Box::new(move |core| {
            let _ = sender.send(inspect(core));
        })))?;
        receiver.recv().map_err(|_| Error::Shutdown)
    }

    fn send(&self, control: Control) -> Result<(), Error> {
        self.control.send(control).map_err(|_| Error::Shutdown)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut core: CoordinatorCore, links: Receiver<LinkEvent>, controls: Receiver<Control>, idle_timeout: Option<Duration>) {
    let mut last_activity = Instant::now();

    loop {
        let idle = match idle_timeout {
            Some(timeout) => channel::after(timeout.saturating_sub(last_activity.elapsed())),
            None => channel::never(),
        };

        select! {
            recv(links) -> event => match event {
                Ok(event) => {
                    if matches!(event, LinkEvent::Message { .. }) {
                        last_activity = Instant::now();
                    }
                    core.handle_link(event);
                }
                Err(_) => break,
            },
            recv(controls) -> control => match control {
                Ok(Control::Shutdown) | Err(_) => {
                    debug!("coordinator shutdown requested");
                    break;
                }
                Ok(control) => core.handle_control(control),
            },
            recv(idle) -> _ => {
                info!("coordinator idle for {:?}, suspending", idle_timeout.unwrap_or_default());
                break;
            }
        }
    }

    info!("coordinator stopped");
}
