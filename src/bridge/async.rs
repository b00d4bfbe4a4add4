//! Asynchronous bridge

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{connection_name, from_page, snapshot_request, to_page};
use crate::broadcast::{PageChannel, SubscriptionId};
use crate::connection::r#async::{Connect, Connection};
use crate::connection::ReconnectPolicy;
use crate::domain::TabId;
use crate::persistence::Storage;
use crate::Error;

/// Relay between one tab's page channel and the coordinator, driven by tokio tasks.
pub struct Bridge {
    inner: Arc<Inner>,
    storage: Arc<Storage>,
    page_subscription: SubscriptionId,
    storage_subscription: SubscriptionId,
}

struct Inner {
    tab_id: TabId,
    page: Arc<PageChannel>,
    connector: Arc<dyn Connect>,
    policy: ReconnectPolicy,
    connection: Mutex<Option<Arc<Connection>>>,
    reconnect: UnboundedSender<()>,
    detached: AtomicBool,
}

impl Bridge {
    pub async fn attach(tab_id: TabId, page: Arc<PageChannel>, connector: Arc<dyn Connect>, storage: Arc<Storage>) -> Result<Bridge, Error> {
        Self::attach_with_policy(tab_id, page, connector, storage, ReconnectPolicy::default()).await
    }

    pub async fn attach_with_policy(
        tab_id: TabId,
        page: Arc<PageChannel>,
        connector: Arc<dyn Connect>,
        storage: Arc<Storage>,
        policy: ReconnectPolicy,
    ) -> Result<Bridge, Error> {
        let (reconnect, reconnects) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            tab_id,
            page: Arc::clone(&page),
            connector,
            policy,
            connection: Mutex::new(None),
            reconnect,
            detached: AtomicBool::new(false),
        });

        inner.connect().await?;

        let relay = Arc::downgrade(&inner);
        let page_subscription = page.subscribe(move |message: &Value| {
            if let Some(inner) = relay.upgrade() {
                inner.forward(message);
            }
        });

        let watcher = Arc::downgrade(&inner);
        let storage_subscription = storage.subscribe(move |_| {
            if let Some(inner) = watcher.upgrade() {
                if !inner.is_connected() {
                    let _ = inner.reconnect.send(());
                }
            }
        });

        tokio::spawn(reconnect_worker(Arc::downgrade(&inner), reconnects));

        Ok(Bridge {
            inner,
            storage,
            page_subscription,
            storage_subscription,
        })
    }

    pub fn tab_id(&self) -> TabId {
        self.inner.tab_id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn detach(&self) {
        if self.inner.detached.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.page.unsubscribe(self.page_subscription);
        self.storage.unsubscribe(self.storage_subscription);
        if let Some(connection) = self.inner.take_connection() {
            connection.disconnect();
        }
        debug!("bridge for tab {} detached", self.inner.tab_id);
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>) -> Result<(), Error> {
        let connection = Arc::new(self.connector.connect(&connection_name(self.tab_id)).await?);

        match self.connection.lock() {
            Ok(mut current) => *current = Some(Arc::clone(&connection)),
            Err(e) => return Err(e.into()),
        }

        tokio::spawn(read_from_coordinator(Arc::downgrade(self), Arc::clone(&connection)));

        connection.post(snapshot_request())
    }

    fn forward(&self, message: &Value) {
        let Some(envelope) = from_page(message) else {
            return;
        };

        match self.current() {
            Some(connection) => {
                if let Err(e) = connection.post(envelope) {
                    warn!("bridge for tab {}: forwarding failed: {e}", self.tab_id);
                }
            }
            None => debug!("bridge for tab {} disconnected, dropping {}", self.tab_id, envelope.msg.kind()),
        }
    }

    fn current(&self) -> Option<Arc<Connection>> {
        self.connection.lock().ok().and_then(|current| current.clone())
    }

    fn take_connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().ok().and_then(|mut current| current.take())
    }

    fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    fn clear(&self, lost: &Arc<Connection>) {
        if let Ok(mut current) = self.connection.lock() {
            if current.as_ref().is_some_and(|connection| Arc::ptr_eq(connection, lost)) {
                *current = None;
                info!("bridge for tab {} lost its connection", self.tab_id);
            }
        }
    }

    async fn reconnect_with_policy(self: &Arc<Self>) {
        let mut attempt = 1;
        while let Some(delay) = self.policy.delay_before(attempt) {
            tokio::time::sleep(delay).await;
            if self.detached.load(Ordering::SeqCst) {
                return;
            }

            match self.connect().await {
                Ok(()) => {
                    info!("bridge for tab {} reconnected on attempt {attempt}", self.tab_id);
                    return;
                }
                Err(e) => warn!(
                    "bridge for tab {}: reconnection attempt {attempt}/{} failed: {e}",
                    self.tab_id, self.policy.max_attempts
                ),
            }
            attempt += 1;
        }

        error!("bridge for tab {} gave up reconnecting", self.tab_id);
    }
}

async fn read_from_coordinator(inner: Weak<Inner>, connection: Arc<Connection>) {
    while let Ok(envelope) = connection.recv().await {
        match inner.upgrade() {
            Some(inner) => {
                inner.page.publish(&to_page(&envelope));
            }
            None => return,
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.clear(&connection);
    }
}

async fn reconnect_worker(inner: Weak<Inner>, mut reconnects: UnboundedReceiver<()>) {
    while reconnects.recv().await.is_some() {
        while reconnects.try_recv().is_ok() {}

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.detached.load(Ordering::SeqCst) {
            return;
        }
        if !inner.is_connected() {
            inner.reconnect_with_policy().await;
        }
    }
}
