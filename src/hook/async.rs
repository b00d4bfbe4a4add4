//! Asynchronous page context.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use log::debug;
use tokio::runtime::Handle;

use super::global::{HookGlobal, Interception};
use super::http::{HttpRequest, HttpResponse, ResponseType, XhrBody};
use super::xhr::{ReadyState, XhrCore, XhrEvent, XhrSnapshot};
use crate::broadcast::PageChannel;
use crate::Error;

/// The page's real network stack.
#[async_trait]
pub trait Network: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// A page context whose network calls run on tokio.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

struct PageInner {
    channel: Arc<PageChannel>,
    network: Arc<dyn Network>,
    hook: OnceLock<Arc<HookGlobal>>,
}

impl Page {
    pub fn new(channel: Arc<PageChannel>, network: Arc<dyn Network>) -> Page {
        Page {
            inner: Arc::new(PageInner {
                channel,
                network,
                hook: OnceLock::new(),
            }),
        }
    }

    pub fn channel(&self) -> &Arc<PageChannel> {
        &self.inner.channel
    }

    /// Installs the interception hook. Later calls return the hook installed first.
    pub fn install_hook(&self) -> Arc<HookGlobal> {
        let hook = self.inner.hook.get_or_init(|| {
            debug!("installing interception hook");
            HookGlobal::install(Arc::clone(&self.inner.channel))
        });
        Arc::clone(hook)
    }

    pub fn hook(&self) -> Option<Arc<HookGlobal>> {
        self.inner.hook.get().cloned()
    }

    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.inner.resolve(request).await
    }

    pub fn xhr(&self) -> XmlHttpRequest {
        XmlHttpRequest {
            page: Arc::clone(&self.inner),
            core: Arc::new(XhrCore::default()),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("hooked", &self.inner.hook.get().is_some()).finish()
    }
}

impl PageInner {
    async fn resolve(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let Some(hook) = self.hook.get() else {
            return self.network.execute(&request).await;
        };

        let started = Instant::now();
        match hook.intercept(&request) {
            Interception::Passthrough => self.network.execute(&request).await,
            Interception::Mock { call, mock } => {
                if !mock.delay.is_zero() {
                    tokio::time::sleep(mock.delay).await;
                }
                let response = HttpResponse::json_ok(&call.url, &mock.body);
                hook.capture(&call, mock.body, started);
                Ok(response)
            }
            Interception::Observe { call } => {
                let response = self.network.execute(&request).await?;
                match response.json() {
                    Ok(body) => hook.capture(&call, body, started),
                    Err(e) => debug!("not capturing {}: {e}", call.operation_name),
                }
                Ok(response)
            }
        }
    }
}

/// XHR-style request. Events fire from a tokio task after [XmlHttpRequest::send].
pub struct XmlHttpRequest {
    page: Arc<PageInner>,
    core: Arc<XhrCore>,
}

impl XmlHttpRequest {
    pub fn open(&self, method: &str, url: &str) {
        self.core.open(method, url);
    }

    pub fn set_request_header(&self, name: &str, value: &str) -> Result<(), Error> {
        self.core.set_request_header(name, value)
    }

    pub fn set_response_type(&self, response_type: ResponseType) {
        self.core.set_response_type(response_type);
    }

    pub fn on<F>(&self, event: XhrEvent, listener: F)
    where
        F: Fn(XhrEvent, &XhrSnapshot) + Send + Sync + 'static,
    {
        self.core.on(event, listener);
    }

    /// Dispatches the request on the current runtime. Fails without touching the request when
    /// called outside a tokio runtime.
    pub fn send(&self, body: Option<String>) -> Result<(), Error> {
        let runtime = Handle::try_current().map_err(|e| Error::Simple(format!("send requires a tokio runtime: {e}")))?;
        let request = self.core.begin_send(body)?;
        let page = Arc::clone(&self.page);
        let core = Arc::clone(&self.core);

        runtime.spawn(async move {
            let result = page.resolve(request).await;
            core.complete(result);
        });

        Ok(())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.core.ready_state()
    }

    pub fn status(&self) -> u16 {
        self.core.status()
    }

    pub fn status_text(&self) -> String {
        self.core.status_text()
    }

    pub fn response(&self) -> Option<XhrBody> {
        self.core.response()
    }

    pub fn response_text(&self) -> Option<String> {
        self.core.response_text()
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        self.core.response_header(name)
    }

    pub fn get_all_response_headers(&self) -> String {
        self.core.all_response_headers()
    }
}

impl fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlHttpRequest").field("ready_state", &self.ready_state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::MockDefinition;
    use crate::messages::{tag_page_message, Envelope, Message, Role, BRIDGE_SOURCE};

    const URL: &str = "https://api.example.com/graphql";

    #[derive(Default)]
    struct CountingNetwork {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Network for CountingNetwork {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::json_ok(&request.url, &json!({"data": {"real": true}})))
        }
    }

    fn page_with_mock(network: Arc<CountingNetwork>, mock: MockDefinition) -> Page {
        let page = Page::new(Arc::new(PageChannel::new()), network);
        page.install_hook();

        let update = Envelope::new(Role::Coordinator, Role::Bridge, Message::MockUpdate { custom_responses: vec![mock] });
        page.channel().publish(&tag_page_message(BRIDGE_SOURCE, &update));
        page
    }

    fn request(operation: &str) -> HttpRequest {
        HttpRequest::post(URL, json!({"operationName": operation, "query": "{ x }"}).to_string())
    }

    #[tokio::test]
    async fn test_mocked_fetch() {
        let network = Arc::new(CountingNetwork::default());
        let page = page_with_mock(network.clone(), MockDefinition::new("GetUser", json!({"data": {"user": null}})).delay(50));

        let started = Instant::now();
        let response = page.fetch(request("GetUser")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(response.json().unwrap(), json!({"data": {"user": null}}));
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);

        page.fetch(request("ListItems")).await.unwrap();
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_xhr_json_response() {
        let network = Arc::new(CountingNetwork::default());
        let page = page_with_mock(network, MockDefinition::new("GetUser", json!({"data": 1})));

        let xhr = page.xhr();
        xhr.set_response_type(ResponseType::Json);
        xhr.open("POST", URL);

        let (sender, mut events) = mpsc::unbounded_channel();
        xhr.on(XhrEvent::LoadEnd, move |_, snapshot| {
            let _ = sender.send(snapshot.clone());
        });
        xhr.send(request("GetUser").body).unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot.status, 200);
        assert_eq!(snapshot.response, Some(XhrBody::Json(json!({"data": 1}))));
        assert_eq!(xhr.ready_state(), ReadyState::Done);
    }

    #[test]
    fn test_xhr_send_outside_runtime() {
        let network = Arc::new(CountingNetwork::default());
        let page = page_with_mock(network.clone(), MockDefinition::new("GetUser", json!({"data": 1})));

        let xhr = page.xhr();
        xhr.open("POST", URL);

        let result = xhr.send(request("GetUser").body);
        assert!(matches!(result, Err(Error::Simple(_))));
        assert_eq!(xhr.ready_state(), ReadyState::Opened);
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);

        // still sendable once a runtime is available
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let (sender, mut events) = mpsc::unbounded_channel();
            xhr.on(XhrEvent::LoadEnd, move |_, snapshot| {
                let _ = sender.send(snapshot.status);
            });
            xhr.send(request("GetUser").body).unwrap();
            let status = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
            assert_eq!(status, Some(200));
        });
    }
}
