//! Threaded UI surface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, warn};

use super::common::{connection_name, envelope, SurfaceModel, SurfaceOptions, SurfaceStatus};
use crate::broadcast::SubscriptionId;
use crate::connection::sync::{Connect, Connection};
use crate::domain::{MockDefinition, Settings, StoreState, TabId, Theme};
use crate::live::{LiveChannel, LiveUpdate};
use crate::messages::Message;
use crate::transfer::ExportFile;
use crate::Error;

/// A UI surface attached to one tab.
///
/// The surface keeps the latest snapshot of its tab, turns user intents into mutation
/// messages, pings the coordinator while open and reconnects after a drop. Dropping the
/// surface closes it.
pub struct Surface {
    inner: Arc<Inner>,
    stop_keep_alive: Mutex<Option<Sender<()>>>,
    live: Mutex<Option<(Arc<LiveChannel>, SubscriptionId)>>,
}

struct Inner {
    tab_id: TabId,
    connector: Arc<dyn Connect>,
    options: SurfaceOptions,
    connection: Mutex<Option<Arc<Connection>>>,
    model: Mutex<SurfaceModel>,
    changed: Condvar,
    live: Mutex<Option<Arc<LiveChannel>>>,
    closed: AtomicBool,
}

impl Surface {
    pub fn open(tab_id: TabId, connector: Arc<dyn Connect>) -> Result<Surface, Error> {
        Self::open_with_options(tab_id, connector, SurfaceOptions::default())
    }

    /// Connects and requests the tab's snapshot.
    pub fn open_with_options(tab_id: TabId, connector: Arc<dyn Connect>, options: SurfaceOptions) -> Result<Surface, Error> {
        let inner = Arc::new(Inner {
            tab_id,
            connector,
            options,
            connection: Mutex::new(None),
            model: Mutex::new(SurfaceModel::new()),
            changed: Condvar::new(),
            live: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        inner.connect()?;

        let (stop, stopped) = channel::bounded(0);
        let pinger = Arc::downgrade(&inner);
        thread::Builder::new()
            .name(format!("gqlmock-keep-alive-{tab_id}"))
            .spawn(move || keep_alive(pinger, options.keep_alive, stopped))?;

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

    /// Latest snapshot received, if any.
    pub fn snapshot(&self) -> Option<StoreState> {
        self.inner.model().snapshot.clone()
    }

    /// Number of snapshots received so far.
    pub fn revision(&self) -> u64 {
        self.inner.model().revision
    }

    /// Blocks until a snapshot satisfying `predicate` has been received, or `timeout` passes.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<StoreState>
    where
        F: Fn(&StoreState) -> bool,
    {
        self.inner.wait_until(timeout, |model| model.snapshot.as_ref().filter(|state| predicate(*state)).cloned())
    }

    /// Blocks until a snapshot newer than the current one arrives.
    pub fn next_snapshot(&self, timeout: Duration) -> Option<StoreState> {
        let seen = self.revision();
        self.inner
            .wait_until(timeout, |model| if model.revision > seen { model.snapshot.clone() } else { None })
    }

    pub fn request_snapshot(&self) -> Result<(), Error> {
        self.inner.post(Message::SnapshotRequest)
    }

    /// Creates or replaces one mock.
    ///
    /// Mock edits send the tab's whole mock list, so every edit fails with
    /// [Error::NotSynchronized] until the first snapshot arrived. See [Surface::wait_for].
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

    /// Flips activation of a mock, returning the new flag. Unknown operations are left alone.
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

    /// Changes the theme and tells open pop-out editors.
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

    /// Upserts every mock of the file one by one, then applies its settings.
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

    /// Applies mocks saved by pop-out editors of this tab, and publishes theme changes to them.
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
            stop.take();
        }
        if let Some(connection) = self.inner.take_connection() {
            connection.disconnect();
        }
        self.inner.set_status(SurfaceStatus::Closed);
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

    fn set_status(&self, status: SurfaceStatus) {
        self.model().status = status;
        self.changed.notify_all();
    }

    fn live(&self) -> Option<Arc<LiveChannel>> {
        self.live.lock().ok().and_then(|live| live.clone())
    }

    fn connect(self: &Arc<Self>) -> Result<(), Error> {
        let connection = Arc::new(self.connector.connect(&connection_name(self.tab_id))?);
        *self.connection.lock()? = Some(Arc::clone(&connection));
        self.set_status(SurfaceStatus::Connected);

        let reader = Arc::downgrade(self);
        let reading = Arc::clone(&connection);
        thread::Builder::new()
            .name(format!("gqlmock-surface-{}", self.tab_id))
            .spawn(move || read_from_coordinator(reader, reading))?;

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
                self.model().apply_snapshot(state);
                self.changed.notify_all();
            }
            other => debug!("surface for tab {} ignoring {}", self.tab_id, other.kind()),
        }
    }

    fn wait_until<T, F>(&self, timeout: Duration, ready: F) -> Option<T>
    where
        F: Fn(&SurfaceModel) -> Option<T>,
    {
        let deadline = Instant::now() + timeout;
        let mut model = self.model();
        loop {
            if let Some(value) = ready(&model) {
                return Some(value);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            model = match self.changed.wait_timeout(model, deadline - now) {
                Ok((model, _)) => model,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Drops `lost` if it is still current. Returns false if a newer connection replaced it.
    fn clear(&self, lost: &Arc<Connection>) -> bool {
        match self.connection.lock() {
            Ok(mut current) if current.as_ref().is_some_and(|connection| Arc::ptr_eq(connection, lost)) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    fn reconnect_with_policy(self: &Arc<Self>) {
        self.set_status(SurfaceStatus::Reconnecting);

        let policy = self.options.policy;
        let mut attempt = 1;
        while let Some(delay) = policy.delay_before(attempt) {
            thread::sleep(delay);
            if self.closed.load(Ordering::SeqCst) {
                return;
            }

            match self.connect() {
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
        self.set_status(SurfaceStatus::GaveUp);
    }
}

fn read_from_coordinator(inner: Weak<Inner>, connection: Arc<Connection>) {
    while let Ok(envelope) = connection.recv() {
        match inner.upgrade() {
            Some(inner) => inner.receive(envelope.msg),
            None => return,
        }
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.closed.load(Ordering::SeqCst) || !inner.clear(&connection) {
        return;
    }

    info!("surface for tab {} lost its connection", inner.tab_id);
    inner.reconnect_with_policy();
}

fn keep_alive(inner: Weak<Inner>, interval: Duration, stopped: Receiver<()>) {
    let ticker = channel::tick(interval);
    loop {
        crossbeam::select! {
            recv(stopped) -> _ => return,
            recv(ticker) -> _ => {
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
