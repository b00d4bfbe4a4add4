//! Asynchronous UI surface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::stream::{self, Stream};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};

use super::common::{connection_name, envelope, SurfaceModel, SurfaceOptions, SurfaceStatus};
use crate::broadcast::SubscriptionId;
use crate::connection::r#async::{Connect, Connection};
use crate::domain::{MockDefinition, Settings, StoreState, TabId, Theme};
use crate::live::{LiveChannel, LiveUpdate};
use crate::messages::Message;
use crate::transfer::ExportFile;
use crate::Error;

/// A UI surface attached to one tab, driven by tokio tasks.
pub struct Surface {
    inner: Arc<Inner>,
    stop_keep_alive: Mutex<Option<oneshot::Sender<()>>>,
    live: Mutex<Option<(Arc<LiveChannel>, SubscriptionId)>>,
}

struct Inner {
    tab_id: TabId,
    connector: Arc<dyn Connect>,
    options: SurfaceOptions,
    connection: Mutex<Option<Arc<Connection>>>,
    model: Mutex<SurfaceModel>,
    revisions: watch::Sender<u64>,
    reconnect: UnboundedSender<()>,
    live: Mutex<Option<Arc<LiveChannel>>>,
    closed: AtomicBool,
}

impl Surface {
    pub async fn open(tab_id: TabId, connector: Arc<dyn Connect>) -> Result<Surface, Error> {
        Self::open_with_options(tab_id, connector, SurfaceOptions::default()).await
    }

    pub async fn open_with_options(tab_id: TabId, connector: Arc<dyn Connect>, options: SurfaceOptions) -> Result<Surface, Error> {
        let (reconnect, reconnects) = mpsc::unbounded_channel();
        let (revisions, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            tab_id,
            connector,
            options,
            connection: Mutex::new(None),
            model: Mutex::new(SurfaceModel::new()),
            revisions,
            reconnect,
            live: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        inner.connect().await?;

        let (stop, stopped) = oneshot::channel();
        tokio::spawn(keep_alive(Arc::downgrade(&inner), options.keep_alive, stopped));
        tokio::spawn(reconnect_worker(Arc::downgrade(&inner), reconnects));

        info!("surface for tab {tab_id} opened");

        Ok(Surface {
            inner,
            stop_keep_alive: Mutex::new(Some(stop)),
            live: Mutex::new(None),
        })
    }

    pub fn tab_id(&self) -> TabId {
        self.inner.tab_id
    }

    pub fn status(&self) -> SurfaceStatus {
        self.inner.model().status
    }

    pub fn is_connected(&self) -> bool {
        self.inner.current().is_some()
    }

    pub fn snapshot(&self) -> Option<StoreState> {
        self.inner.model().snapshot.clone()
    }

    pub fn revision(&self) -> u64 {
        self.inner.model().revision
    }

    /// Waits until a snapshot satisfying `predicate` has been received, or `timeout` passes.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<StoreState>
    where
        F: Fn(&StoreState) -> bool,
    {
        let mut revisions = self.inner.revisions.subscribe();
        let wait = async {
            loop {
                let found = {
                    let model = self.inner.model();
                    model.snapshot.as_ref().filter(|state| predicate(*state)).cloned()
                };
                if found.is_some() {
                    return found;
                }
                if revisions.changed().await.is_err() {
                    return None;
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Snapshots as they arrive. Snapshots arriving faster than they are consumed are
    /// coalesced into the latest one.
    pub fn snapshots(&self) -> impl Stream<Item = StoreState> + Send + 'static {
        let inner = Arc::downgrade(&self.inner);
        let revisions = self.inner.revisions.subscribe();

        stream::unfold((inner, revisions), |(inner, mut revisions)| async move {
            revisions.changed().await.ok()?;
            let snapshot = inner.upgrade()?.model().snapshot.clone()?;
            Some((snapshot, (inner, revisions)))
        })
    }

    pub fn request_snapshot(&self) -> Result<(), Error> {
        self.inner.post(Message::SnapshotRequest)
    }

    /// Creates or replaces one mock. Fails with [Error::NotSynchronized] until the first snapshot arrived.
    pub fn save_mock(&self, mock: MockDefinition) -> Result<(), Error> {
        self.inner.save_mock(mock)
    }

    /// Validates JSON text before saving it as an activated mock.
    pub fn save_mock_text(&self, operation_name: &str, text: &str) -> Result<MockDefinition, Error> {
        let mut mock = MockDefinition::parse(operation_name, text)?;
        if let Some(existing) = self.inner.model().mock(operation_name) {
            mock.delay = existing.delay;
        }
        self.inner.save_mock(mock.clone())?;
        Ok(mock)
    }

    pub fn delete_mock(&self, operation_name: &str) -> Result<(), Error> {
        let update = self.inner.model().delete(operation_name)?;
        self.inner.post(update)
    }

    pub fn toggle_mock(&self, operation_name: &str) -> Result<Option<bool>, Error> {
        let toggled = self.inner.model().toggle(operation_name)?;
        match toggled {
            Some((activated, update)) => {
                self.inner.post(update)?;
                Ok(Some(activated))
            }
            None => Ok(None),
        }
    }

    pub fn settings(&self) -> Settings {
        self.inner.model().settings()
    }

    pub fn update_settings(&self, settings: Settings) -> Result<(), Error> {
        let update = self.inner.model().update_settings(settings);
        self.inner.post(update)
    }

    pub fn set_global_mock_enabled(&self, enabled: bool) -> Result<(), Error> {
        let settings = Settings {
            global_mock_enabled: enabled,
            ..self.settings()
        };
        self.update_settings(settings)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), Error> {
        let settings = Settings { theme, ..self.settings() };
        self.update_settings(settings)?;

        if let Some(live) = self.inner.live() {
            live.publish(&LiveUpdate::ThemeChanged { theme });
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), Error> {
        self.inner.post(Message::ClearAll)
    }

    pub fn export(&self) -> ExportFile {
        self.inner.model().export()
    }

    pub fn export_json(&self) -> Result<String, Error> {
        self.export().to_json()
    }

    pub fn import(&self, file: &ExportFile) -> Result<(), Error> {
        let messages = self.inner.model().import(file)?;
        for message in messages {
            self.inner.post(message)?;
        }
        info!("surface for tab {} imported {} mocks", self.inner.tab_id, file.custom_responses.len());
        Ok(())
    }

    pub fn import_json(&self, text: &str) -> Result<ExportFile, Error> {
        let file = ExportFile::from_json(text)?;
        self.import(&file)?;
        Ok(file)
    }

    pub fn attach_live(&self, channel: Arc<LiveChannel>) {
        self.detach_live();

        let receiver = Arc::downgrade(&self.inner);
        let subscription = channel.subscribe(move |update| {
            let Some(inner) = receiver.upgrade() else {
                return;
            };
            if let LiveUpdate::MockSaved { tab_id, mock } = update {
                if *tab_id == inner.tab_id {
                    if let Err(e) = inner.save_mock(mock.clone()) {
                        warn!("surface for tab {}: applying pop-out save failed: {e}", inner.tab_id);
                    }
                }
            }
        });

        if let Ok(mut live) = self.inner.live.lock() {
            *live = Some(Arc::clone(&channel));
        }
        if let Ok(mut current) = self.live.lock() {
            *current = Some((channel, subscription));
        }
    }

    fn detach_live(&self) {
        let previous = self.live.lock().ok().and_then(|mut live| live.take());
        if let Some((channel, subscription)) = previous {
            channel.unsubscribe(subscription);
        }
        if let Ok(mut live) = self.inner.live.lock() {
            *live = None;
        }
    }

    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.detach_live();
        if let Ok(mut stop) = self.stop_keep_alive.lock() {
            if let Some(stop) = stop.take() {
                let _ = stop.send(());
            }
        }
        if let Some(connection) = self.inner.take_connection() {
            connection.disconnect();
        }
        self.inner.model().status = SurfaceStatus::Closed;
        debug!("surface for tab {} closed", self.inner.tab_id);
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn model(&self) -> MutexGuard<'_, SurfaceModel> {
        self.model.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live(&self) -> Option<Arc<LiveChannel>> {
        self.live.lock().ok().and_then(|live| live.clone())
    }

    async fn connect(self: &Arc<Self>) -> Result<(), Error> {
        let connection = Arc::new(self.connector.connect(&connection_name(self.tab_id)).await?);
        *self.connection.lock()? = Some(Arc::clone(&connection));
        self.model().status = SurfaceStatus::Connected;

        tokio::spawn(read_from_coordinator(Arc::downgrade(self), Arc::clone(&connection)));

        connection.post(envelope(Message::SnapshotRequest))
    }

    fn current(&self) -> Option<Arc<Connection>> {
        self.connection.lock().ok().and_then(|current| current.clone())
    }

    fn take_connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().ok().and_then(|mut current| current.take())
    }

    fn post(&self, msg: Message) -> Result<(), Error> {
        let connection = self.current().ok_or(Error::Disconnected)?;
        debug!("surface for tab {} sending {}", self.tab_id, msg.kind());
        connection.post(envelope(msg))
    }

    fn save_mock(&self, mock: MockDefinition) -> Result<(), Error> {
        let update = self.model().upsert(mock)?;
        self.post(update)
    }

    fn receive(&self, msg: Message) {
        match msg {
            Message::Snapshot(state) => {
                let revision = {
                    let mut model = self.model();
                    model.apply_snapshot(state);
                    model.revision
                };
                self.revisions.send_replace(revision);
            }
            other => debug!("surface for tab {} ignoring {}", self.tab_id, other.kind()),
        }
    }

    fn clear(&self, lost: &Arc<Connection>) -> bool {
        match self.connection.lock() {
            Ok(mut current) if current.as_ref().is_some_and(|connection| Arc::ptr_eq(connection, lost)) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    async fn reconnect_with_policy(self: &Arc<Self>) {
        self.model().status = SurfaceStatus::Reconnecting;

        let policy = self.options.policy;
        let mut attempt = 1;
        while let Some(delay) = policy.delay_before(attempt) {
            tokio::time::sleep(delay).await;
            if self.closed.load(Ordering::SeqCst) {
                return;
            }

            match self.connect().await {
                Ok(()) => {
                    info!("surface for tab {} reconnected on attempt {attempt}", self.tab_id);
                    return;
                }
                Err(e) => warn!(
                    "surface for tab {}: reconnection attempt {attempt}/{} failed: {e}",
                    self.tab_id, policy.max_attempts
                ),
            }
            attempt += 1;
        }

        error!("surface for tab {} gave up reconnecting", self.tab_id);
        self.model().status = SurfaceStatus::GaveUp;
    }
}

async fn read_from_coordinator(inner: Weak<Inner>, connection: Arc<Connection>) {
    while let Ok(envelope) = connection.recv().await {
        match inner.upgrade() {
            Some(inner) => inner.receive(envelope.msg),
            None => return,
        }
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    if !inner.closed.load(Ordering::SeqCst) && inner.clear(&connection) {
        info!("surface for tab {} lost its connection", inner.tab_id);
        let _ = inner.reconnect.send(());
    }
}

async fn reconnect_worker(inner: Weak<Inner>, mut reconnects: UnboundedReceiver<()>) {
    while reconnects.recv().await.is_some() {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        if inner.current().is_none() {
            inner.reconnect_with_policy().await;
        }
    }
}

async fn keep_alive(inner: Weak<Inner>, interval: Duration, mut stopped: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = &mut stopped => return,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if inner.current().is_some() {
                    if let Err(e) = inner.post(Message::KeepAlivePing) {
                        debug!("surface for tab {}: keep-alive not sent: {e}", inner.tab_id);
                    }
                }
            }
        }
    }
}
