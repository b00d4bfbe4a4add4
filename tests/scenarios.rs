#![cfg(feature = "sync")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use gqlmock::bridge::blocking::Bridge;
use gqlmock::broadcast::PageChannel;
use gqlmock::connection::blocking::{Connect, Endpoint};
use gqlmock::connection::ReconnectPolicy;
use gqlmock::coordinator::blocking::Coordinator;
use gqlmock::coordinator::CoordinatorOptions;
use gqlmock::domain::{CapturedResponse, MockDefinition, Settings, StoreState, TabId, Theme};
use gqlmock::hook::blocking::{Network, Page};
use gqlmock::hook::{HookGlobal, HttpRequest, HttpResponse};
use gqlmock::messages::{Envelope, Message, Role};
use gqlmock::persistence::{save_session, save_settings, SessionRecord, Storage};
use gqlmock::surface::blocking::Surface;
use gqlmock::surface::{SurfaceOptions, SurfaceStatus};
use gqlmock::Error;

const URL: &str = "https://api.example.com/graphql";
const TIMEOUT: Duration = Duration::from_secs(3);

/// Answers every call with `{"data": {"n": <call number>}}`.
#[derive(Default)]
struct CountingNetwork {
    calls: AtomicUsize,
}

impl CountingNetwork {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Network for CountingNetwork {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(HttpResponse::json_ok(&request.url, &json!({"data": {"n": n}})))
    }
}

struct Tab {
    page: Page,
    hook: Arc<HookGlobal>,
    network: Arc<CountingNetwork>,
    _bridge: Bridge,
    surface: Surface,
}

impl Tab {
    fn open(tab_id: TabId, endpoint: &Arc<Endpoint>, options: &CoordinatorOptions) -> Tab {
        let network = Arc::new(CountingNetwork::default());
        let page = Page::new(Arc::new(PageChannel::new()), network.clone());
        let hook = page.install_hook();

        let bridge = Bridge::attach(tab_id, Arc::clone(page.channel()), endpoint.clone(), Arc::clone(options.session())).unwrap();
        let surface = Surface::open(tab_id, endpoint.clone()).unwrap();
        surface.wait_for(TIMEOUT, |_| true).unwrap();

        Tab {
            page,
            hook,
            network,
            _bridge: bridge,
            surface,
        }
    }

    fn wait_for_hook<F: Fn(&HookGlobal) -> bool>(&self, ready: F) {
        let deadline = Instant::now() + TIMEOUT;
        while !ready(&self.hook) {
            assert!(Instant::now() < deadline, "hook never reached the expected state");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

fn get_user() -> HttpRequest {
    HttpRequest::post(URL, json!({"operationName": "GetUser", "query": "query GetUser { user { name } }"}).to_string())
}

fn captured(operation_name: &str, timestamp: i64) -> CapturedResponse {
    CapturedResponse {
        operation_name: operation_name.to_string(),
        query: None,
        variables: None,
        response: json!({"data": {"at": timestamp}}),
        timestamp,
        url: URL.to_string(),
        duration: Some(12),
    }
}

#[test]
fn scenario_a_captures_are_kept_newest_first() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let coordinator = Coordinator::start(&endpoint, options.clone()).unwrap();
    let tab = Tab::open(1, &endpoint, &options);

    for _ in 0..3 {
        tab.page.fetch(get_user()).unwrap();
    }

    let state = tab
        .surface
        .wait_for(TIMEOUT, |state| state.responses.get("GetUser").is_some_and(|history| history.len() == 3))
        .unwrap();
    let bodies: Vec<&Value> = state.responses["GetUser"].iter().map(|captured| &captured.response).collect();
    assert_eq!(bodies, vec![&json!({"data": {"n": 3}}), &json!({"data": {"n": 2}}), &json!({"data": {"n": 1}})]);
    assert_eq!(coordinator.state(1).unwrap().unwrap().responses["GetUser"].len(), 3);
    assert_eq!(tab.network.calls(), 3);
}

#[test]
fn scenario_b_delayed_mock_is_served_and_captured() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let _coordinator = Coordinator::start(&endpoint, options.clone()).unwrap();
    let tab = Tab::open(1, &endpoint, &options);

    let body = json!({"data": {"user": null}});
    tab.surface.save_mock(MockDefinition::new("GetUser", body.clone()).delay(500)).unwrap();
    tab.wait_for_hook(|hook| hook.mock_table().lookup("GetUser").is_some());

    let started = Instant::now();
    let response = tab.page.fetch(get_user()).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(response.status, 200);
    assert_eq!(response.json().unwrap(), body);
    assert_eq!(tab.network.calls(), 0);

    let state = tab.surface.wait_for(TIMEOUT, |state| state.responses.contains_key("GetUser")).unwrap();
    assert_eq!(state.responses["GetUser"][0].response, body);
    assert!(state.responses["GetUser"][0].duration.unwrap() >= 500);
}

#[test]
fn scenario_c_empty_mock_set_restores_real_traffic() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let _coordinator = Coordinator::start(&endpoint, options.clone()).unwrap();
    let tab = Tab::open(1, &endpoint, &options);

    tab.surface.save_mock(MockDefinition::new("GetUser", json!({"data": {}}))).unwrap();
    tab.wait_for_hook(|hook| hook.mock_table().lookup("GetUser").is_some());
    tab.page.fetch(get_user()).unwrap();
    assert_eq!(tab.network.calls(), 0);

    tab.hook
        .send_message(&Envelope::to_coordinator(Role::Bridge, Message::MockUpdate { custom_responses: Vec::new() }));
    tab.wait_for_hook(|hook| hook.mock_table().is_empty());

    let response = tab.page.fetch(get_user()).unwrap();
    assert_eq!(response.json().unwrap(), json!({"data": {"n": 1}}));
    assert_eq!(tab.network.calls(), 1);
}

#[test]
fn scenario_d_restart_restores_session_with_durable_settings() {
    let _ = env_logger::try_init();
    let session = Storage::memory();
    let durable = Storage::memory();

    let global = Settings {
        global_mock_enabled: false,
        theme: Theme::Dark,
    };
    save_settings(&durable, &global).unwrap();

    let mut state = StoreState::default();
    state.responses.insert(String::from("GetUser"), vec![captured("GetUser", 20), captured("GetUser", 10)]);
    state.custom_responses.insert(String::from("GetUser"), MockDefinition::new("GetUser", json!({"data": 1})));
    state.settings = Settings::default();
    save_session(&session, &SessionRecord::from_state(12, &state)).unwrap();

    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default().session_storage(session).durable_storage(durable);
    let coordinator = Coordinator::start(&endpoint, options).unwrap();

    let restored = coordinator.state(12).unwrap().unwrap();
    assert_eq!(restored.responses["GetUser"].len(), 2);
    assert_eq!(restored.custom_responses.len(), 1);
    assert_eq!(restored.settings, global);
    assert_eq!(coordinator.settings().unwrap(), global);
}

#[test]
fn scenario_e_surface_catches_up_after_reconnect() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let first = Coordinator::start(&endpoint, options.clone()).unwrap();

    let surface_options = SurfaceOptions::default().policy(ReconnectPolicy::new(5, Duration::from_millis(50)));
    let surface = Surface::open_with_options(5, endpoint.clone(), surface_options).unwrap();
    surface.wait_for(TIMEOUT, |_| true).unwrap();

    first.shutdown();
    let _second = Coordinator::start(&endpoint, options).unwrap();

    let bridge = endpoint.connect("bridge/5").unwrap();
    for timestamp in 1..=3 {
        bridge
            .post(Envelope::to_coordinator(
                Role::Bridge,
                Message::ResponseCaptured {
                    responses: vec![captured("ListItems", timestamp)],
                },
            ))
            .unwrap();
    }

    let state = surface
        .wait_for(TIMEOUT, |state| state.responses.get("ListItems").is_some_and(|history| history.len() == 3))
        .unwrap();
    assert_eq!(state.responses["ListItems"][0].timestamp, 3);
    assert_eq!(surface.status(), SurfaceStatus::Connected);
}

#[test]
fn closing_a_tab_discards_its_store() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let coordinator = Coordinator::start(&endpoint, options.clone()).unwrap();
    let tab = Tab::open(3, &endpoint, &options);

    tab.page.fetch(get_user()).unwrap();
    tab.surface.wait_for(TIMEOUT, |state| !state.responses.is_empty()).unwrap();

    coordinator.tab_closed(3).unwrap();
    assert_eq!(coordinator.state(3).unwrap(), None);
    assert!(options.session().keys().unwrap().is_empty());
}

#[test]
fn closed_tab_does_not_come_back_through_connected_clients() {
    let _ = env_logger::try_init();
    let endpoint = Endpoint::new();
    let options = CoordinatorOptions::default();
    let coordinator = Coordinator::start(&endpoint, options.clone()).unwrap();

    let fast_retry = SurfaceOptions::default().policy(ReconnectPolicy::new(5, Duration::from_millis(20)));
    let closing = Surface::open_with_options(3, endpoint.clone(), fast_retry).unwrap();
    closing.wait_for(TIMEOUT, |_| true).unwrap();
    let other = Surface::open(9, endpoint.clone()).unwrap();
    other.wait_for(TIMEOUT, |_| true).unwrap();

    coordinator.tab_closed(3).unwrap();
    thread::sleep(Duration::from_millis(300));
    other.clear_all().unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while !options.session().keys().unwrap().contains(&String::from("tab-9")) {
        assert!(Instant::now() < deadline, "tab 9 was never persisted");
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(coordinator.tabs().unwrap(), vec![9]);
    assert_eq!(options.session().keys().unwrap(), vec!["tab-9"]);

    coordinator.shutdown();
    let restarted = Coordinator::start(&Endpoint::new(), options).unwrap();
    assert_eq!(restarted.tabs().unwrap(), vec![9]);
}
