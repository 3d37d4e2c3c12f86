//! Response types produced by resolvers and received from the network.
//!
//! - [`MockResponse`]: what a resolver produces; every part is optional so a
//!   resolver can describe only the headers or only the body it wants to patch
//! - [`HttpResponse`]: a complete response, either captured from the network
//!   or final after resolution
//! - [`patch_response`]: merge of the two

mod patch;

pub use patch::patch_response;

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;
use std::str::FromStr;

/// A complete HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// A response produced by a resolver, possibly partial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl MockResponse {
    /// A response with nothing set; completes to `200` with an empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A `200` response with a JSON body and `Content-Type: application/json`.
    pub fn json<T: Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::with_status(StatusCode::OK)
            .content_type("application/json")
            .body(body)
    }

    /// A `200` response with a text body and `Content-Type: text/plain`.
    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::with_status(StatusCode::OK)
            .content_type("text/plain")
            .body(text)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Append a header, ignoring invalid names or values.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn content_type(mut self, value: &'static str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(value));
        self
    }

    /// Complete this response without an original: `200` and an empty body
    /// stand in for anything unset.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        }
    }
}
