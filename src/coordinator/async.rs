//! Asynchronous coordinator host

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::common::{Control, CoordinatorCore};
use super::CoordinatorOptions;
use crate::connection::r#async::Endpoint;
use crate::connection::LinkEvent;
use crate::domain::{Badge, Settings, StoreState, TabId};
use crate::Error;

/// A coordinator running as a tokio task.
#[derive(Debug)]
pub struct Coordinator {
    control: UnboundedSender<Control>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Restores persisted state, binds to `endpoint` and spawns the event loop.
    pub async fn start(endpoint: &Endpoint, options: CoordinatorOptions) -> Result<Coordinator, Error> {
        let links = endpoint.bind()?;
        let core = CoordinatorCore::start(&options);
        let (control, controls) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(core, links, controls, options.idle_timeout));
        info!("coordinator started");

        Ok(Coordinator {
            control,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn tab_closed(&self, tab_id: TabId) -> Result<(), Error> {
        self.send(Control::TabClosed(tab_id))
    }

    pub async fn state(&self, tab_id: TabId) -> Result<Option<StoreState>, Error> {
        self.inspect(move |core| core.state(tab_id)).await
    }

    pub async fn badge(&self, tab_id: TabId) -> Result<Badge, Error> {
        self.inspect(move |core| core.badge(tab_id)).await
    }

    pub async fn tabs(&self) -> Result<Vec<TabId>, Error> {
        self.inspect(|core| core.tabs()).await
    }

    pub async fn settings(&self) -> Result<Settings, Error> {
        self.inspect(|core| core.settings()).await
    }

    pub fn is_running(&self) -> bool {
        match self.handle.lock() {
            Ok(handle) => handle.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(_) => false,
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
        self.join().await;
    }

    /// Waits until the event loop stops, by shutdown or idle suspension.
    pub async fn join(&self) {
        let handle = match self.handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("coordinator task failed: {e}");
            }
        }
    }

    async fn inspect<T, F>(&self, inspect: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&CoordinatorCore) -> T + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.send(Control::Inspect(Box::new(move |core| {
            let _ = sender.send(inspect(core));
        })))?;
        receiver.await.map_err(|_| Error::Shutdown)
    }

    fn send(&self, control: Control) -> Result<(), Error> {
        self.control.send(control).map_err(|_| Error::Shutdown)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
    }
}

async fn run(
    mut core: CoordinatorCore,
    mut links: UnboundedReceiver<LinkEvent>,
    mut controls: UnboundedReceiver<Control>,
    idle_timeout: Option<Duration>,
) {
    let mut last_activity = Instant::now();

    loop {
        let idle = async {
            match idle_timeout {
                Some(timeout) => tokio::time::sleep(timeout.saturating_sub(last_activity.elapsed())).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = links.recv() => match event {
                Some(event) => {
                    if matches!(event, LinkEvent::Message { .. }) {
                        last_activity = Instant::now();
                    }
                    core.handle_link(event);
                }
                None => break,
            },
            control = controls.recv() => match control {
                Some(Control::Shutdown) | None => {
                    debug!("coordinator shutdown requested");
                    break;
                }
                Some(control) => core.handle_control(control),
            },
            _ = idle => {
                info!("coordinator idle for {:?}, suspending", idle_timeout.unwrap_or_default());
                break;
            }
        }
    }

    info!("coordinator stopped");
}
