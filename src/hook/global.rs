use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::debug;
use serde_json::Value;

use super::classify::{classify, GraphQLCall};
use super::http::HttpRequest;
use super::mock_table::{MockEntry, MockTable};
use crate::broadcast::{PageChannel, SubscriptionId};
use crate::domain::{now_millis, CapturedResponse};
use crate::messages::{tag_page_message, untag_page_message, Envelope, Message, Role, BRIDGE_SOURCE, HOOK_SOURCE};

/// Event name every listener registered for receives, whatever the message kind.
pub const ANY_MESSAGE: &str = "message";

type HookListener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// The page-global coordination point installed once per page.
///
/// It mirrors the tab's mocks and global switch from bridge-tagged page messages, lets
/// page code observe those messages by kind, and posts hook-tagged envelopes for the bridge.
pub struct HookGlobal {
    channel: Arc<PageChannel>,
    table: RwLock<MockTable>,
    listeners: RwLock<HashMap<String, Vec<HookListener>>>,
    subscription: RwLock<Option<SubscriptionId>>,
}

/// What to do with one outgoing request.
pub(crate) enum Interception {
    Passthrough,
    Mock { call: GraphQLCall, mock: MockEntry },
    Observe { call: GraphQLCall },
}

impl HookGlobal {
    pub(crate) fn install(channel: Arc<PageChannel>) -> Arc<HookGlobal> {
        let hook = Arc::new(HookGlobal {
            channel: Arc::clone(&channel),
            table: RwLock::new(MockTable::new()),
            listeners: RwLock::new(HashMap::new()),
            subscription: RwLock::new(None),
        });

        let receiver = Arc::downgrade(&hook);
        let subscription = channel.subscribe(move |message: &Value| {
            let Some(hook) = receiver.upgrade() else {
                return;
            };
            if let Some(envelope) = untag_page_message(message, BRIDGE_SOURCE) {
                hook.receive(&envelope);
            }
        });
        *hook.subscription.write().unwrap_or_else(|e| e.into_inner()) = Some(subscription);

        hook
    }

    /// Registers a listener for messages of one kind (`"snapshot"`, `"mockUpdate"`...) or for
    /// every message with [ANY_MESSAGE].
    pub fn subscribe<F>(&self, event: &str, listener: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.entry(event.to_string()).or_default().push(Arc::new(listener));
    }

    /// Posts an envelope on the page channel for the bridge.
    pub fn send_message(&self, envelope: &Envelope) {
        self.channel.publish(&tag_page_message(HOOK_SOURCE, envelope));
    }

    /// A copy of the current mock table.
    pub fn mock_table(&self) -> MockTable {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn receive(&self, envelope: &Envelope) {
        {
            let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
            match &envelope.msg {
                Message::Snapshot(state) => table.apply_snapshot(state),
                Message::MockUpdate { custom_responses } => table.replace(custom_responses),
                Message::SettingsUpdate { settings } => table.set_settings(settings),
                _ => {}
            }
        }

        self.emit(envelope.msg.kind(), envelope);
        self.emit(ANY_MESSAGE, envelope);
    }

    fn emit(&self, event: &str, envelope: &Envelope) {
        let listeners: Vec<HookListener> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners.get(event).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(envelope);
        }
    }

    pub(crate) fn intercept(&self, request: &HttpRequest) -> Interception {
        let Some(call) = classify(request) else {
            return Interception::Passthrough;
        };

        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        match table.lookup(&call.operation_name) {
            Some(mock) => Interception::Mock { mock: mock.clone(), call },
            None => Interception::Observe { call },
        }
    }

    pub(crate) fn capture(&self, call: &GraphQLCall, response: Value, started: Instant) {
        let captured = CapturedResponse {
            operation_name: call.operation_name.clone(),
            query: call.query.clone(),
            variables: call.variables.clone(),
            response,
            timestamp: now_millis(),
            url: call.url.clone(),
            duration: Some(started.elapsed().as_millis() as u64),
        };

        debug!("captured {} from {}", captured.operation_name, captured.url);
        self.send_message(&Envelope::to_coordinator(Role::Bridge, Message::ResponseCaptured { responses: vec![captured] }));
    }
}

impl Drop for HookGlobal {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            self.channel.unsubscribe(subscription);
        }
    }
}

impl fmt::Debug for HookGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookGlobal").field("mocks", &self.mock_table().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::domain::{MockDefinition, Settings};

    fn from_bridge(channel: &PageChannel, msg: Message) {
        channel.publish(&tag_page_message(BRIDGE_SOURCE, &Envelope::new(Role::Coordinator, Role::Bridge, msg)));
    }

    fn graphql(operation: &str) -> HttpRequest {
        HttpRequest::post("https://example.com/graphql", json!({"operationName": operation, "query": "{ x }"}).to_string())
    }

    #[test]
    fn test_mirrors_mock_updates_and_settings() {
        let channel = Arc::new(PageChannel::new());
        let hook = HookGlobal::install(Arc::clone(&channel));

        from_bridge(
            &channel,
            Message::MockUpdate {
                custom_responses: vec![MockDefinition::new("GetUser", json!({"data": {}}))],
            },
        );
        assert!(matches!(hook.intercept(&graphql("GetUser")), Interception::Mock { .. }));
        assert!(matches!(hook.intercept(&graphql("Other")), Interception::Observe { .. }));
        assert!(matches!(hook.intercept(&HttpRequest::get("https://example.com/")), Interception::Passthrough));

        from_bridge(
            &channel,
            Message::SettingsUpdate {
                settings: Settings {
                    global_mock_enabled: false,
                    ..Settings::default()
                },
            },
        );
        assert!(matches!(hook.intercept(&graphql("GetUser")), Interception::Observe { .. }));
    }

    #[test]
    fn test_ignores_own_and_foreign_messages() {
        let channel = Arc::new(PageChannel::new());
        let hook = HookGlobal::install(Arc::clone(&channel));

        let update = Envelope::new(
            Role::Coordinator,
            Role::Bridge,
            Message::MockUpdate {
                custom_responses: vec![MockDefinition::new("GetUser", json!(1))],
            },
        );
        channel.publish(&tag_page_message(HOOK_SOURCE, &update));
        channel.publish(&json!({"type": "MockUpdate"}));

        assert!(hook.mock_table().is_empty());
    }

    #[test]
    fn test_subscribe_by_kind_and_any() {
        let channel = Arc::new(PageChannel::new());
        let hook = HookGlobal::install(Arc::clone(&channel));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let by_kind = Arc::clone(&seen);
        hook.subscribe("clearAll", move |envelope| by_kind.lock().unwrap().push(format!("kind:{}", envelope.msg.kind())));
        let any = Arc::clone(&seen);
        hook.subscribe(ANY_MESSAGE, move |envelope| any.lock().unwrap().push(format!("any:{}", envelope.msg.kind())));

        from_bridge(&channel, Message::ClearAll);
        from_bridge(&channel, Message::KeepAlivePing);

        assert_eq!(*seen.lock().unwrap(), vec!["kind:clearAll", "any:clearAll", "any:keepAlivePing"]);
    }

    #[test]
    fn test_capture_posts_tagged_envelope() {
        let channel = Arc::new(PageChannel::new());
        let hook = HookGlobal::install(Arc::clone(&channel));

        let posted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&posted);
        channel.subscribe(move |message| {
            if let Some(envelope) = untag_page_message(message, HOOK_SOURCE) {
                sink.lock().unwrap().push(envelope);
            }
        });

        let Interception::Observe { call } = hook.intercept(&graphql("GetUser")) else {
            panic!("expected GetUser to be observed");
        };
        hook.capture(&call, json!({"data": 1}), Instant::now());

        let posted = posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].to, Role::Coordinator);
        match &posted[0].msg {
            Message::ResponseCaptured { responses } => {
                assert_eq!(responses[0].operation_name, "GetUser");
                assert_eq!(responses[0].response, json!({"data": 1}));
                assert_eq!(responses[0].query.as_deref(), Some("{ x }"));
            }
            msg => panic!("unexpected {msg:?}"),
        }
    }

    #[test]
    fn test_drop_unsubscribes() {
        let channel = Arc::new(PageChannel::new());
        let hook = HookGlobal::install(Arc::clone(&channel));
        assert_eq!(channel.listener_count(), 1);

        drop(hook);
        assert_eq!(channel.listener_count(), 0);
    }
}
