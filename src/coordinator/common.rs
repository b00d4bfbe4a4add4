//! Coordinator state machine shared by the threaded and tokio hosts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::recorder::MessageRecorder;
use super::routing::{determine_routing, RoutingDecision};
use super::{BadgeObserver, CoordinatorOptions};
use crate::connection::{ConnectionId, LinkEvent, Port};
use crate::domain::{Badge, Settings, StoreState, TabId};
use crate::messages::{ConnectionName, Envelope, Message, Role};
use crate::persistence::{self, SessionRecord, Storage};
use crate::store::{Mutation, Store};

/// Roles that receive snapshot fan-out.
const OBSERVERS: [Role; 2] = [Role::UiSurface, Role::Bridge];

#[derive(Debug)]
struct Registration {
    name: ConnectionName,
    port: Box<dyn Port>,
}

/// Requests a host forwards to the core besides connection traffic.
pub(crate) enum Control {
    TabClosed(TabId),
    Inspect(Box<dyn FnOnce(&CoordinatorCore) + Send>),
    Shutdown,
}

pub(crate) struct CoordinatorCore {
    stores: BTreeMap<TabId, Store>,
    connections: HashMap<ConnectionId, Registration>,
    routes: HashMap<TabId, HashMap<Role, ConnectionId>>,
    settings: Settings,
    badges: BTreeMap<TabId, Badge>,
    closed: BTreeSet<TabId>,
    session: Arc<Storage>,
    durable: Arc<Storage>,
    badge_observer: Option<BadgeObserver>,
    recorder: MessageRecorder,
}

impl CoordinatorCore {
    /// Loads global settings, then restores every persisted tab session.
    pub(crate) fn start(options: &CoordinatorOptions) -> Self {
        let settings = match persistence::load_settings(&options.durable) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("could not read settings, using defaults: {e}");
                Settings::default()
            }
        };

        let mut core = CoordinatorCore {
            stores: BTreeMap::new(),
            connections: HashMap::new(),
            routes: HashMap::new(),
            settings,
            badges: BTreeMap::new(),
            closed: BTreeSet::new(),
            session: Arc::clone(&options.session),
            durable: Arc::clone(&options.durable),
            badge_observer: options.badge_observer.clone(),
            recorder: options.recorder.clone(),
        };

        let records = match persistence::load_sessions(&core.session) {
            Ok(records) => records,
            Err(e) => {
                warn!("could not read persisted sessions, starting empty: {e}");
                Vec::new()
            }
        };

        if !records.is_empty() {
            info!("restoring {} persisted tab sessions", records.len());
        }
        for record in records {
            let tab_id = record.tab_id;
            let store = core.store_mut(tab_id);
            store.apply(Mutation::Restore(record));
            // global settings win over the copy embedded in the session
            store.set_settings(settings);
            core.after_mutation(tab_id);
        }

        core
    }

    pub(crate) fn handle_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { id, name, port } => self.register(id, &name, port),
            LinkEvent::Message { id, envelope } => {
                self.recorder.record_inbound(&envelope);
                match self.connections.get(&id) {
                    Some(registration) => {
                        let tab_id = registration.name.tab_id;
                        self.handle_envelope(tab_id, envelope);
                    }
                    None => warn!("dropping {} from unknown connection {id}", envelope.msg.kind()),
                }
            }
            LinkEvent::Disconnected { id } => self.unregister(id),
        }
    }

    pub(crate) fn handle_control(&mut self, control: Control) {
        match control {
            Control::TabClosed(tab_id) => self.tab_closed(tab_id),
            Control::Inspect(inspect) => inspect(self),
            Control::Shutdown => {}
        }
    }

    fn register(&mut self, id: ConnectionId, name: &str, port: Box<dyn Port>) {
        let name = match name.parse::<ConnectionName>() {
            Ok(name) => name,
            Err(e) => {
                warn!("rejecting connection {id}: {e}");
                return;
            }
        };

        info!("connection {id} registered as {name}");

        if self.closed.contains(&name.tab_id) {
            debug!("connection {id}: tab {} is closed, not routed", name.tab_id);
        } else if name.role != Role::Coordinator {
            // the coordinator never forwards to itself
            let previous = self.routes.entry(name.tab_id).or_default().insert(name.role, id);
            if let Some(previous) = previous {
                debug!("connection {id} supersedes {previous} for {name}");
            }
        }

        self.connections.insert(id, Registration { name, port });
    }

    fn unregister(&mut self, id: ConnectionId) {
        let Some(registration) = self.connections.remove(&id) else {
            return;
        };
        let name = registration.name;
        info!("connection {id} ({name}) disconnected");

        if let Some(routes) = self.routes.get_mut(&name.tab_id) {
            if routes.get(&name.role) == Some(&id) {
                routes.remove(&name.role);
            }
            if routes.is_empty() {
                self.routes.remove(&name.tab_id);
            }
        }
    }

    pub(crate) fn handle_envelope(&mut self, tab_id: TabId, envelope: Envelope) {
        debug!("tab {tab_id}: {} {} -> {}", envelope.msg.kind(), envelope.from, envelope.to);

        if self.closed.contains(&tab_id) {
            debug!("tab {tab_id} is closed, ignoring {}", envelope.msg.kind());
            return;
        }

        match determine_routing(&envelope) {
            RoutingDecision::KeepAlive => {}
            RoutingDecision::SnapshotRequest => {
                self.store_mut(tab_id);
                self.fan_out(tab_id);
            }
            RoutingDecision::Mutate(Mutation::SetSettings(settings)) => {
                self.store_mut(tab_id);
                self.update_settings(settings);
            }
            RoutingDecision::Mutate(mutation) => {
                self.store_mut(tab_id).apply(mutation);
                self.after_mutation(tab_id);
            }
            RoutingDecision::Forward(role) => self.forward(tab_id, role, envelope),
            RoutingDecision::Unroutable => warn!("tab {tab_id}: dropping {} addressed to coordinator", envelope.msg.kind()),
        }
    }

    /// Settings are global: every store takes them, every tab is notified.
    fn update_settings(&mut self, settings: Settings) {
        info!("settings updated: {settings:?}");
        self.settings = settings;

        if let Err(e) = persistence::save_settings(&self.durable, &settings) {
            error!("failed to persist settings: {e}");
        }

        let tabs: Vec<TabId> = self.stores.keys().copied().collect();
        for tab_id in &tabs {
            if let Some(store) = self.stores.get_mut(tab_id) {
                store.apply(Mutation::SetSettings(settings));
            }
            self.fan_out(*tab_id);
        }

        self.persist();
        for tab_id in tabs {
            self.update_badge(tab_id);
        }
    }

    fn after_mutation(&mut self, tab_id: TabId) {
        self.fan_out(tab_id);
        self.persist();
        self.update_badge(tab_id);
    }

    fn forward(&self, tab_id: TabId, role: Role, envelope: Envelope) {
        let Some(registration) = self.route(tab_id, role) else {
            debug!("tab {tab_id}: no {role} connected, dropping {}", envelope.msg.kind());
            return;
        };

        self.recorder.record_outbound(&envelope);
        if let Err(e) = registration.port.post(envelope) {
            warn!("tab {tab_id}: forward to {role} failed: {e}");
        }
    }

    /// Pushes the tab's current snapshot to its UI surface and bridge.
    fn fan_out(&self, tab_id: TabId) {
        let Some(store) = self.stores.get(&tab_id) else {
            return;
        };

        for role in OBSERVERS {
            let Some(registration) = self.route(tab_id, role) else {
                continue;
            };

            let envelope = Envelope::new(Role::Coordinator, role, Message::Snapshot(store.snapshot()));
            self.recorder.record_outbound(&envelope);
            if let Err(e) = registration.port.post(envelope) {
                warn!("tab {tab_id}: snapshot to {role} failed: {e}");
            }
        }
    }

    /// Writes every tab to the session area and removes records of tabs no longer known.
    fn persist(&self) {
        for (tab_id, store) in &self.stores {
            let record = SessionRecord::from_state(*tab_id, store.state());
            if let Err(e) = persistence::save_session(&self.session, &record) {
                error!("failed to persist tab {tab_id}: {e}");
            }
        }

        match persistence::session_tabs(&self.session) {
            Ok(persisted) => {
                for tab_id in persisted.into_iter().filter(|tab_id| !self.stores.contains_key(tab_id)) {
                    if let Err(e) = persistence::remove_session(&self.session, tab_id) {
                        error!("failed to remove stale session of tab {tab_id}: {e}");
                    }
                }
            }
            Err(e) => error!("failed to list persisted sessions: {e}"),
        }
    }

    fn update_badge(&mut self, tab_id: TabId) {
        let badge = self.stores.get(&tab_id).map(Store::badge).unwrap_or(Badge::Cleared);
        let previous = self.badges.insert(tab_id, badge);

        if previous != Some(badge) {
            debug!("tab {tab_id}: badge {badge:?}");
            if let Some(observer) = &self.badge_observer {
                observer(tab_id, badge);
            }
        }
    }

    /// Tears down a tab for good. Its connections stay open but are no longer routed, so
    /// clients left behind cannot bring the store back by reconnecting.
    pub(crate) fn tab_closed(&mut self, tab_id: TabId) {
        info!("tab {tab_id} closed");

        self.closed.insert(tab_id);
        self.stores.remove(&tab_id);
        self.routes.remove(&tab_id);

        if self.badges.remove(&tab_id).is_some_and(|badge| badge != Badge::Cleared) {
            if let Some(observer) = &self.badge_observer {
                observer(tab_id, Badge::Cleared);
            }
        }

        self.persist();
    }

    fn route(&self, tab_id: TabId, role: Role) -> Option<&Registration> {
        let id = self.routes.get(&tab_id)?.get(&role)?;
        self.connections.get(id)
    }

    fn store_mut(&mut self, tab_id: TabId) -> &mut Store {
        let settings = self.settings;
        self.stores.entry(tab_id).or_insert_with(|| {
            debug!("tab {tab_id}: creating store");
            Store::new(settings)
        })
    }

    pub(crate) fn state(&self, tab_id: TabId) -> Option<StoreState> {
        self.stores.get(&tab_id).map(Store::snapshot)
    }

    pub(crate) fn badge(&self, tab_id: TabId) -> Badge {
        self.badges.get(&tab_id).copied().unwrap_or(Badge::Cleared)
    }

    pub(crate) fn tabs(&self) -> Vec<TabId> {
        self.stores.keys().copied().collect()
    }

    pub(crate) fn settings(&self) -> Settings {
        self.settings
    }

    /// Connection currently routed for a tab and role.
    #[cfg(test)]
    pub(crate) fn routed(&self, tab_id: TabId, role: Role) -> Option<ConnectionId> {
        self.routes.get(&tab_id)?.get(&role).copied()
    }
}

#[cfg(test)]
mod tests;
