//! Asynchronous connections over tokio channels

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::common::{ConnectionId, LinkEvent};
use crate::messages::Envelope;
use crate::Error;

/// Opens named connections to whatever coordinator is currently bound.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, name: &str) -> Result<Connection, Error>;
}

/// Rendezvous point between a coordinator task and its clients.
#[derive(Debug, Default)]
pub struct Endpoint {
    links: RwLock<Option<UnboundedSender<LinkEvent>>>,
}

impl Endpoint {
    pub fn new() -> Arc<Endpoint> {
        Arc::new(Endpoint::default())
    }

    /// Binds a coordinator, replacing any previous binding.
    pub(crate) fn bind(&self) -> Result<UnboundedReceiver<LinkEvent>, Error> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.links.write()? = Some(sender);
        Ok(receiver)
    }

    fn links(&self) -> Result<UnboundedSender<LinkEvent>, Error> {
        let links = self.links.read()?.clone().ok_or(Error::ConnectionFailed)?;
        if links.is_closed() {
            return Err(Error::ConnectionFailed);
        }
        Ok(links)
    }
}

#[async_trait]
impl Connect for Endpoint {
    async fn connect(&self, name: &str) -> Result<Connection, Error> {
        Connection::open(name, self.links()?)
    }
}

/// Client end of a connection to the coordinator.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    name: String,
    links: UnboundedSender<LinkEvent>,
    inbound: Mutex<UnboundedReceiver<Envelope>>,
    closed: AtomicBool,
}

impl Connection {
    pub(crate) fn open(name: &str, links: UnboundedSender<LinkEvent>) -> Result<Connection, Error> {
        let id = ConnectionId::next();
        let (port, inbound) = mpsc::unbounded_channel::<Envelope>();

        links
            .send(LinkEvent::Connected {
                id,
                name: name.to_string(),
                port: Box::new(port),
            })
            .map_err(|_| Error::ConnectionFailed)?;
        debug!("connection {id} opened as {name}");

        Ok(Connection {
            id,
            name: name.to_string(),
            links,
            inbound: Mutex::new(inbound),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Posting never waits; the channel to the coordinator is unbounded.
    pub fn post(&self, envelope: Envelope) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Disconnected);
        }
        self.links
            .send(LinkEvent::Message { id: self.id, envelope })
            .map_err(|_| Error::Disconnected)
    }

    pub async fn recv(&self) -> Result<Envelope, Error> {
        self.inbound.lock().await.recv().await.ok_or(Error::Disconnected)
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Envelope>, Error> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Envelope>, Error> {
        let Ok(mut inbound) = self.inbound.try_lock() else {
            return Ok(None);
        };
        match inbound.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::Disconnected),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("connection {} ({}) closed", self.id, self.name);
            let _ = self.links.send(LinkEvent::Disconnected { id: self.id });
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
