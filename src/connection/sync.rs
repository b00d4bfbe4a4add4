//! Synchronous connections over crossbeam channels

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;

use super::common::{ConnectionId, LinkEvent};
use crate::messages::Envelope;
use crate::Error;

/// Opens named connections to whatever coordinator is currently bound.
pub trait Connect: Send + Sync {
    fn connect(&self, name: &str) -> Result<Connection, Error>;
}

/// Rendezvous point between a coordinator and its clients.
///
/// A restarted coordinator binds again to the same endpoint; clients holding connections
/// to the previous instance observe a disconnect and reconnect through here.
#[derive(Debug, Default)]
pub struct Endpoint {
    links: RwLock<Option<Sender<LinkEvent>>>,
}

impl Endpoint {
    pub fn new() -> Arc<Endpoint> {
        Arc::new(Endpoint::default())
    }

    /// Binds a coordinator, replacing any previous binding.
    pub(crate) fn bind(&self) -> Result<Receiver<LinkEvent>, Error> {
        let (sender, receiver) = channel::unbounded();
        *self.links.write()? = Some(sender);
        Ok(receiver)
    }
}

impl Connect for Endpoint {
    fn connect(&self, name: &str) -> Result<Connection, Error> {
        let links = self.links.read()?.clone().ok_or(Error::ConnectionFailed)?;
        Connection::open(name, links)
    }
}

/// Client end of a connection to the coordinator.
///
/// Dropping the connection disconnects it.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    name: String,
    links: Sender<LinkEvent>,
    inbound: Receiver<Envelope>,
    closed: AtomicBool,
}

impl Connection {
    pub(crate) fn open(name: &str, links: Sender<LinkEvent>) -> Result<Connection, Error> {
        let id = ConnectionId::next();
        let (port, inbound) = channel::unbounded::<Envelope>();

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
            inbound,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post(&self, envelope: Envelope) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Disconnected);
        }
        self.links
            .send(LinkEvent::Message { id: self.id, envelope })
            .map_err(|_| Error::Disconnected)
    }

    /// Blocks until the coordinator sends an envelope. Fails once the coordinator side is gone.
    pub fn recv(&self) -> Result<Envelope, Error> {
        self.inbound.recv().map_err(|_| Error::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Envelope>, Error> {
        match self.inbound.recv_timeout(timeout) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Envelope>, Error> {
        match self.inbound.try_recv() {
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
