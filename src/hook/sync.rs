//! Blocking page context.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

use log::debug;

use super::global::{HookGlobal, Interception};
use super::http::{HttpRequest, HttpResponse, ResponseType, XhrBody};
use super::xhr::{ReadyState, XhrCore, XhrEvent, XhrSnapshot};
use crate::broadcast::PageChannel;
use crate::Error;

/// The page's real network stack.
pub trait Network: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// A page context: its message channel, its network, and the hook once installed.
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

    /// Fetch-style call.
    pub fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.inner.resolve(request)
    }

    /// Creates an XHR-style request object.
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
    fn resolve(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let Some(hook) = self.hook.get() else {
            return self.network.execute(&request);
        };

        let started = Instant::now();
        match hook.intercept(&request) {
            Interception::Passthrough => self.network.execute(&request),
            Interception::Mock { call, mock } => {
                if !mock.delay.is_zero() {
                    thread::sleep(mock.delay);
                }
                let response = HttpResponse::json_ok(&call.url, &mock.body);
                hook.capture(&call, mock.body, started);
                Ok(response)
            }
            Interception::Observe { call } => {
                let response = self.network.execute(&request)?;
                match response.json() {
                    Ok(body) => hook.capture(&call, body, started),
                    Err(e) => debug!("not capturing {}: {e}", call.operation_name),
                }
                Ok(response)
            }
        }
    }
}

/// XHR-style request. Events fire on a background thread after [XmlHttpRequest::send].
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

    /// Sends the request. Returns once the request is dispatched; completion is signalled by events.
    pub fn send(&self, body: Option<String>) -> Result<(), Error> {
        let request = self.core.begin_send(body)?;
        let page = Arc::clone(&self.page);
        let core = Arc::clone(&self.core);

        thread::Builder::new().name(String::from("gqlmock-xhr")).spawn(move || {
            let result = page.resolve(request);
            core.complete(result);
        })?;

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
