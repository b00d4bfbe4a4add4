//! State machine shared by the XHR-style request objects of both runtimes.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use super::http::{HttpRequest, HttpResponse, ResponseType, XhrBody};
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XhrEvent {
    ReadyStateChange,
    Load,
    LoadEnd,
    Error,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

/// The request object as seen by a listener when an event fires.
#[derive(Clone, Debug, PartialEq)]
pub struct XhrSnapshot {
    pub ready_state: ReadyState,
    pub status: u16,
    pub status_text: String,
    pub response_url: String,
    pub response: Option<XhrBody>,
    pub response_headers: Vec<(String, String)>,
}

type XhrListener = Arc<dyn Fn(XhrEvent, &XhrSnapshot) + Send + Sync>;

#[derive(Default)]
struct XhrState {
    method: String,
    url: String,
    request_headers: Vec<(String, String)>,
    response_type: ResponseType,
    ready_state: ReadyState,
    sent: bool,
    response: Option<HttpResponse>,
}

#[derive(Default)]
pub(crate) struct XhrCore {
    state: Mutex<XhrState>,
    listeners: Mutex<Vec<(XhrEvent, XhrListener)>>,
}

impl XhrCore {
    fn state(&self) -> MutexGuard<'_, XhrState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn open(&self, method: &str, url: &str) {
        {
            let mut state = self.state();
            *state = XhrState {
                method: method.to_string(),
                url: url.to_string(),
                response_type: state.response_type,
                ready_state: ReadyState::Opened,
                ..XhrState::default()
            };
        }
        self.emit(XhrEvent::ReadyStateChange);
    }

    pub(crate) fn set_request_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut state = self.state();
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(Error::Simple(String::from("request headers can only be set after open and before send")));
        }
        state.request_headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub(crate) fn set_response_type(&self, response_type: ResponseType) {
        self.state().response_type = response_type;
    }

    pub(crate) fn on<F>(&self, event: XhrEvent, listener: F)
    where
        F: Fn(XhrEvent, &XhrSnapshot) + Send + Sync + 'static,
    {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).push((event, Arc::new(listener)));
    }

    /// Marks the request as sent and builds what goes on the wire.
    pub(crate) fn begin_send(&self, body: Option<String>) -> Result<HttpRequest, Error> {
        let mut state = self.state();
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(Error::Simple(String::from("send requires an opened, unsent request")));
        }
        state.sent = true;

        Ok(HttpRequest {
            method: state.method.clone(),
            url: state.url.clone(),
            headers: state.request_headers.clone(),
            body,
        })
    }

    /// Settles the request and emits its events in order.
    pub(crate) fn complete(&self, result: Result<HttpResponse, Error>) {
        match result {
            Ok(response) => {
                self.state().response = Some(response);
                for ready_state in [ReadyState::HeadersReceived, ReadyState::Loading, ReadyState::Done] {
                    self.state().ready_state = ready_state;
                    self.emit(XhrEvent::ReadyStateChange);
                }
                self.emit(XhrEvent::Load);
            }
            Err(e) => {
                debug!("xhr request failed: {e}");
                self.state().ready_state = ReadyState::Done;
                self.emit(XhrEvent::ReadyStateChange);
                self.emit(XhrEvent::Error);
            }
        }
        self.emit(XhrEvent::LoadEnd);
    }

    pub(crate) fn snapshot(&self) -> XhrSnapshot {
        let state = self.state();
        let response = state.response.as_ref();
        XhrSnapshot {
            ready_state: state.ready_state,
            status: response.map(|r| r.status).unwrap_or(0),
            status_text: response.map(|r| r.status_text.clone()).unwrap_or_default(),
            response_url: response.map(|r| r.url.clone()).unwrap_or_default(),
            response: response.and_then(|r| r.body_as(state.response_type)),
            response_headers: response.map(|r| r.headers.clone()).unwrap_or_default(),
        }
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    pub(crate) fn status(&self) -> u16 {
        self.state().response.as_ref().map(|r| r.status).unwrap_or(0)
    }

    pub(crate) fn status_text(&self) -> String {
        self.state().response.as_ref().map(|r| r.status_text.clone()).unwrap_or_default()
    }

    pub(crate) fn response(&self) -> Option<XhrBody> {
        let state = self.state();
        state.response.as_ref().and_then(|r| r.body_as(state.response_type))
    }

    /// Body as text. Only available with the text response type.
    pub(crate) fn response_text(&self) -> Option<String> {
        let state = self.state();
        if state.response_type != ResponseType::Text {
            return None;
        }
        state.response.as_ref().map(HttpResponse::text)
    }

    pub(crate) fn response_header(&self, name: &str) -> Option<String> {
        self.state().response.as_ref().and_then(|r| r.header_value(name)).map(String::from)
    }

    pub(crate) fn all_response_headers(&self) -> String {
        self.state().response.as_ref().map(HttpResponse::all_headers).unwrap_or_default()
    }

    fn emit(&self, event: XhrEvent) {
        let listeners: Vec<XhrListener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.iter().filter(|(e, _)| *e == event).map(|(_, l)| Arc::clone(l)).collect()
        };
        if listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for listener in listeners {
            listener(event, &snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record(core: &XhrCore) -> Arc<Mutex<Vec<(XhrEvent, ReadyState)>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        for event in [XhrEvent::ReadyStateChange, XhrEvent::Load, XhrEvent::LoadEnd, XhrEvent::Error] {
            let sink = Arc::clone(&events);
            core.on(event, move |event, snapshot| sink.lock().unwrap().push((event, snapshot.ready_state)));
        }
        events
    }

    #[test]
    fn test_successful_request_event_order() {
        let core = XhrCore::default();
        let events = record(&core);

        core.open("POST", "https://example.com/graphql");
        core.set_request_header("Content-Type", "application/json").unwrap();
        let request = core.begin_send(Some(String::from("{}"))).unwrap();
        assert_eq!(request.headers, vec![(String::from("Content-Type"), String::from("application/json"))]);

        core.complete(Ok(HttpResponse::json_ok("https://example.com/graphql", &json!({"ok": true}))));

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                (XhrEvent::ReadyStateChange, ReadyState::Opened),
                (XhrEvent::ReadyStateChange, ReadyState::HeadersReceived),
                (XhrEvent::ReadyStateChange, ReadyState::Loading),
                (XhrEvent::ReadyStateChange, ReadyState::Done),
                (XhrEvent::Load, ReadyState::Done),
                (XhrEvent::LoadEnd, ReadyState::Done),
            ]
        );
        assert_eq!(core.status(), 200);
        assert_eq!(core.response_text().as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(core.response_header("Content-Type").as_deref(), Some("application/json"));
    }

    #[test]
    fn test_failed_request() {
        let core = XhrCore::default();
        let events = record(&core);

        core.open("GET", "https://example.com/");
        core.begin_send(None).unwrap();
        core.complete(Err(Error::Network(String::from("connection refused"))));

        let events = events.lock().unwrap();
        assert_eq!(events[events.len() - 2].0, XhrEvent::Error);
        assert_eq!(events[events.len() - 1].0, XhrEvent::LoadEnd);
        assert_eq!(core.status(), 0);
        assert_eq!(core.response(), None);
    }

    #[test]
    fn test_misuse_is_rejected() {
        let core = XhrCore::default();
        assert!(core.set_request_header("a", "b").is_err());
        assert!(core.begin_send(None).is_err());

        core.open("GET", "https://example.com/");
        core.begin_send(None).unwrap();
        assert!(core.begin_send(None).is_err());
        assert!(core.set_request_header("a", "b").is_err());
    }

    #[test]
    fn test_response_type_selects_body() {
        let core = XhrCore::default();
        core.set_response_type(ResponseType::Json);
        core.open("POST", "https://example.com/graphql");
        core.begin_send(None).unwrap();
        core.complete(Ok(HttpResponse::json_ok("https://example.com/graphql", &json!([1]))));

        assert_eq!(core.response(), Some(XhrBody::Json(json!([1]))));
        assert_eq!(core.response_text(), None);
        assert_eq!(core.snapshot().response_url, "https://example.com/graphql");
    }
}
