//! Request and response values seen by the page's network call sites.

use serde_json::Value;

use crate::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new("POST", url).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A settled HTTP response.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A `200 OK` JSON response.
    pub fn json_ok(url: impl Into<String>, body: &Value) -> Self {
        Self::new(url, 200, "OK", body.to_string()).header("Content-Type", "application/json")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header matching `name`, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Headers in `name: value` lines separated by CRLF.
    pub fn all_headers(&self) -> String {
        self.headers.iter().map(|(name, value)| format!("{}: {value}\r\n", name.to_ascii_lowercase())).collect()
    }

    pub fn content_type(&self) -> &str {
        self.header_value("content-type").unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn array_buffer(&self) -> Vec<u8> {
        self.body.clone()
    }

    pub fn blob(&self) -> Blob {
        Blob {
            content_type: self.content_type().to_string(),
            bytes: self.body.clone(),
        }
    }

    /// The body decoded the way an XHR-style call would for `response_type`.
    ///
    /// A JSON response type with an unparseable body yields `None`.
    pub fn body_as(&self, response_type: ResponseType) -> Option<XhrBody> {
        match response_type {
            ResponseType::Text => Some(XhrBody::Text(self.text())),
            ResponseType::Json => self.json().ok().map(XhrBody::Json),
            ResponseType::ArrayBuffer => Some(XhrBody::ArrayBuffer(self.array_buffer())),
            ResponseType::Blob => Some(XhrBody::Blob(self.blob())),
        }
    }
}

/// Raw bytes tagged with a content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// How an XHR-style call exposes its response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Text,
    Json,
    ArrayBuffer,
    Blob,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XhrBody {
    Text(String),
    Json(Value),
    ArrayBuffer(Vec<u8>),
    Blob(Blob),
}
