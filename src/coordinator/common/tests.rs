use std::collections::BTreeMap;
use std::sync::Mutex;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::domain::{CapturedResponse, MockDefinition, Theme};
use crate::Error;

#[derive(Debug, Clone, Default)]
struct RecordingPort {
    received: Arc<Mutex<Vec<Envelope>>>,
}

impl RecordingPort {
    fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }
}

impl Port for RecordingPort {
    fn post(&self, envelope: Envelope) -> Result<(), crate::Error> {
        self.received.lock().unwrap().push(envelope);
        Ok(())
    }
}

#[derive(Debug)]
struct ClosedPort;

impl Port for ClosedPort {
    fn post(&self, _: Envelope) -> Result<(), crate::Error> {
        Err(Error::Disconnected)
    }
}

fn connect(core: &mut CoordinatorCore, name: &str) -> (ConnectionId, RecordingPort) {
    let id = ConnectionId::next();
    let port = RecordingPort::default();
    core.handle_link(LinkEvent::Connected {
        id,
        name: name.to_string(),
        port: Box::new(port.clone()),
    });
    (id, port)
}

fn send(core: &mut CoordinatorCore, id: ConnectionId, from: Role, msg: Message) {
    core.handle_link(LinkEvent::Message {
        id,
        envelope: Envelope::to_coordinator(from, msg),
    });
}

fn captured(operation_name: &str, timestamp: i64) -> CapturedResponse {
    CapturedResponse {
        operation_name: operation_name.to_string(),
        query: None,
        variables: None,
        response: json!({"data": {"at": timestamp}}),
        timestamp,
        url: String::from("https://api.example.com/graphql"),
        duration: None,
    }
}

fn snapshots(envelopes: Vec<Envelope>) -> Vec<StoreState> {
    envelopes
        .into_iter()
        .map(|envelope| match envelope.msg {
            Message::Snapshot(state) => state,
            msg => panic!("expected snapshot, got {msg:?}"),
        })
        .collect()
}

#[test]
fn test_mutation_fans_out_to_surface_and_bridge() {
    let options = CoordinatorOptions::default();
    let mut core = CoordinatorCore::start(&options);

    let (bridge, bridge_port) = connect(&mut core, "bridge/1");
    let (_, surface_port) = connect(&mut core, "ui-surface/1");
    let (_, other_tab_port) = connect(&mut core, "ui-surface/2");

    send(
        &mut core,
        bridge,
        Role::Bridge,
        Message::ResponseCaptured {
            responses: vec![captured("GetUser", 1)],
        },
    );

    let to_bridge = bridge_port.take();
    assert_eq!(to_bridge.len(), 1);
    assert_eq!(to_bridge[0].to, Role::Bridge);
    assert_eq!(snapshots(to_bridge)[0].responses["GetUser"].len(), 1);

    let to_surface = surface_port.take();
    assert_eq!(to_surface[0].from, Role::Coordinator);
    assert_eq!(to_surface[0].to, Role::UiSurface);

    assert!(other_tab_port.take().is_empty());
    assert_eq!(options.session().keys().unwrap(), vec!["tab-1"]);
}

#[test]
fn test_snapshot_request_fans_out_without_persisting() {
    let options = CoordinatorOptions::default();
    let mut core = CoordinatorCore::start(&options);
    let (bridge, bridge_port) = connect(&mut core, "bridge/4");

    send(&mut core, bridge, Role::Bridge, Message::SnapshotRequest);

    assert_eq!(snapshots(bridge_port.take()), vec![StoreState::default()]);
    assert_eq!(core.tabs(), vec![4]);
    assert!(options.session().keys().unwrap().is_empty());
}

#[test]
fn test_keep_alive_has_no_side_effects() {
    let options = CoordinatorOptions::default();
    let mut core = CoordinatorCore::start(&options);
    let (surface, surface_port) = connect(&mut core, "ui-surface/1");

    send(&mut core, surface, Role::UiSurface, Message::KeepAlivePing);

    assert!(surface_port.take().is_empty());
    assert!(core.tabs().is_empty());
}

#[test]
fn test_forward_to_role() {
    let mut core = CoordinatorCore::start(&CoordinatorOptions::default());
    let (surface, _) = connect(&mut core, "ui-surface/1");

    // no bridge yet: silently dropped
    let envelope = Envelope::new(Role::UiSurface, Role::Bridge, Message::ClearAll);
    core.handle_link(LinkEvent::Message {
        id: surface,
        envelope: envelope.clone(),
    });
    assert!(core.tabs().is_empty());

    let (_, bridge_port) = connect(&mut core, "bridge/1");
    core.handle_link(LinkEvent::Message {
        id: surface,
        envelope: envelope.clone(),
    });
    assert_eq!(bridge_port.take(), vec![envelope]);
}

#[test]
fn test_newer_connection_replaces_route() {
    let mut core = CoordinatorCore::start(&CoordinatorOptions::default());
    let (old, old_port) = connect(&mut core, "ui-surface/1");
    let (new, new_port) = connect(&mut core, "ui-surface/1");
    assert_eq!(core.routed(1, Role::UiSurface), Some(new));

    send(&mut core, old, Role::UiSurface, Message::ClearAll);
    assert!(old_port.take().is_empty());
    assert_eq!(new_port.take().len(), 1);

    // the superseded connection going away leaves the newer mapping in place
    core.handle_link(LinkEvent::Disconnected { id: old });
    assert_eq!(core.routed(1, Role::UiSurface), Some(new));

    core.handle_link(LinkEvent::Disconnected { id: new });
    assert_eq!(core.routed(1, Role::UiSurface), None);
}

#[test]
fn test_invalid_and_self_connection_names() {
    let mut core = CoordinatorCore::start(&CoordinatorOptions::default());

    let (rejected, _) = connect(&mut core, "popup");
    send(&mut core, rejected, Role::UiSurface, Message::ClearAll);
    assert!(core.tabs().is_empty());

    let (own, own_port) = connect(&mut core, "self/9");
    assert_eq!(core.routed(9, Role::Coordinator), None);
    send(&mut core, own, Role::Coordinator, Message::ClearAll);
    assert_eq!(core.tabs(), vec![9]);
    assert!(own_port.take().is_empty());
}

#[test]
fn test_failed_delivery_does_not_affect_other_observers() {
    let mut core = CoordinatorCore::start(&CoordinatorOptions::default());
    core.handle_link(LinkEvent::Connected {
        id: ConnectionId::next(),
        name: String::from("ui-surface/1"),
        port: Box::new(ClosedPort),
    });
    let (bridge, bridge_port) = connect(&mut core, "bridge/1");

    send(&mut core, bridge, Role::Bridge, Message::ClearAll);

    assert_eq!(bridge_port.take().len(), 1);
}

#[test]
fn test_settings_are_global() {
    let badges = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&badges);
    let options = CoordinatorOptions::default().badge_observer(move |tab_id, badge| seen.lock().unwrap().push((tab_id, badge)));
    let mut core = CoordinatorCore::start(&options);

    let (bridge_1, bridge_1_port) = connect(&mut core, "bridge/1");
    let (bridge_2, bridge_2_port) = connect(&mut core, "bridge/2");
    for (id, op) in [(bridge_1, "A"), (bridge_2, "B")] {
        send(
            &mut core,
            id,
            Role::Bridge,
            Message::MockUpdate {
                custom_responses: vec![MockDefinition::new(op, json!({}))],
            },
        );
    }
    bridge_1_port.take();
    bridge_2_port.take();

    let settings = Settings {
        global_mock_enabled: false,
        theme: Theme::Dark,
    };
    send(&mut core, bridge_1, Role::UiSurface, Message::SettingsUpdate { settings });

    assert_eq!(snapshots(bridge_1_port.take())[0].settings, settings);
    assert_eq!(snapshots(bridge_2_port.take())[0].settings, settings);
    assert_eq!(persistence::load_settings(options.durable()).unwrap(), settings);
    assert_eq!(core.settings(), settings);
    assert_eq!(core.badge(1), Badge::Paused);
    assert_eq!(core.badge(2), Badge::Paused);
    assert_eq!(
        *badges.lock().unwrap(),
        vec![(1, Badge::Active(1)), (2, Badge::Active(1)), (1, Badge::Paused), (2, Badge::Paused)]
    );
}

#[test]
fn test_settings_twice_is_idempotent() {
    let mut core = CoordinatorCore::start(&CoordinatorOptions::default());
    let (surface, surface_port) = connect(&mut core, "ui-surface/1");
    let settings = Settings {
        global_mock_enabled: true,
        theme: Theme::Dark,
    };

    send(&mut core, surface, Role::UiSurface, Message::SettingsUpdate { settings });
    send(&mut core, surface, Role::UiSurface, Message::SettingsUpdate { settings });

    let received = snapshots(surface_port.take());
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], received[1]);
}

#[test]
fn test_restore_uses_global_settings() {
    let options = CoordinatorOptions::default();
    let global = Settings {
        global_mock_enabled: false,
        theme: Theme::Light,
    };
    persistence::save_settings(options.durable(), &global).unwrap();

    let record = SessionRecord {
        tab_id: 7,
        responses: BTreeMap::from([(String::from("GetUser"), vec![captured("GetUser", 2), captured("GetUser", 1)])]),
        custom_responses: BTreeMap::from([(String::from("GetUser"), MockDefinition::new("GetUser", json!({})))]),
        settings: Settings {
            global_mock_enabled: true,
            theme: Theme::Dark,
        },
    };
    persistence::save_session(options.session(), &record).unwrap();

    let core = CoordinatorCore::start(&options);

    let state = core.state(7).unwrap();
    assert_eq!(state.responses["GetUser"].len(), 2);
    assert_eq!(state.custom_responses.len(), 1);
    assert_eq!(state.settings, global);
    assert_eq!(core.badge(7), Badge::Paused);
}

#[test]
fn test_tab_closed_removes_state() {
    let options = CoordinatorOptions::default();
    let mut core = CoordinatorCore::start(&options);
    let (bridge, _) = connect(&mut core, "bridge/1");
    let (other, _) = connect(&mut core, "bridge/2");
    send(&mut core, bridge, Role::Bridge, Message::ClearAll);
    send(&mut core, other, Role::Bridge, Message::ClearAll);
    assert_eq!(options.session().keys().unwrap(), vec!["tab-1", "tab-2"]);

    core.handle_control(Control::TabClosed(1));

    assert_eq!(core.tabs(), vec![2]);
    assert_eq!(core.routed(1, Role::Bridge), None);
    assert_eq!(options.session().keys().unwrap(), vec!["tab-2"]);

    let restarted = CoordinatorCore::start(&options);
    assert_eq!(restarted.tabs(), vec![2]);
}

#[test]
fn test_closed_tab_stays_closed_for_connected_clients() {
    let options = CoordinatorOptions::default();
    let mut core = CoordinatorCore::start(&options);
    let (surface, surface_port) = connect(&mut core, "ui-surface/3");
    let (other, _) = connect(&mut core, "ui-surface/9");
    send(&mut core, surface, Role::UiSurface, Message::ClearAll);
    send(&mut core, other, Role::UiSurface, Message::ClearAll);
    surface_port.take();

    core.handle_control(Control::TabClosed(3));

    // the old connection keeps talking and a fresh one tries to resync
    send(&mut core, surface, Role::UiSurface, Message::SnapshotRequest);
    let (reconnected, reconnected_port) = connect(&mut core, "ui-surface/3");
    send(&mut core, reconnected, Role::UiSurface, Message::SnapshotRequest);
    send(&mut core, reconnected, Role::UiSurface, Message::ClearAll);
    send(&mut core, other, Role::UiSurface, Message::ClearAll);

    assert_eq!(core.tabs(), vec![9]);
    assert_eq!(core.state(3), None);
    assert_eq!(core.routed(3, Role::UiSurface), None);
    assert!(surface_port.take().is_empty());
    assert!(reconnected_port.take().is_empty());
    assert_eq!(options.session().keys().unwrap(), vec!["tab-9"]);

    let restarted = CoordinatorCore::start(&options);
    assert_eq!(restarted.tabs(), vec![9]);
}
