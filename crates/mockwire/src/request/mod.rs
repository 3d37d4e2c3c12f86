//! Canonical request model.
//!
//! An intercepted request arrives as a [`RawRequest`] (whatever the hook
//! captured) and is normalized once into an immutable [`CanonicalRequest`]
//! that every matcher reads from.

mod body;

pub use body::{encode_content, MultipartField, RequestBody, UploadedFile};

use crate::error::RequestError;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use hyper::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// A request exactly as captured by the interception hook.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header, ignoring invalid names or values.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body along with its content type.
    pub fn json(mut self, value: &Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Bytes::from(value.to_string());
        self
    }
}

/// Normalized, immutable view of an intercepted request.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    parsed_body: RequestBody,
}

impl CanonicalRequest {
    /// Normalize a raw request.
    ///
    /// Only the method and URL can fail normalization; an undecodable body is
    /// kept as raw bytes.
    pub async fn from_raw(raw: RawRequest) -> Result<Self, RequestError> {
        let method = Method::from_bytes(raw.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RequestError::InvalidMethod(raw.method.clone()))?;
        let url = Url::parse(&raw.url).map_err(|source| RequestError::InvalidUrl {
            url: raw.url.clone(),
            source,
        })?;
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let parsed_body = RequestBody::decode(&raw.headers, &raw.body).await;

        Ok(Self {
            method,
            url,
            query,
            headers: raw.headers,
            body: raw.body,
            parsed_body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://host[:port]` of the request URL.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Origin and path without query string or fragment, safe for logs.
    pub fn public_url(&self) -> String {
        format!("{}{}", self.origin(), self.path())
    }

    /// Query parameters in order, duplicates kept.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a query parameter.
    pub fn query_params(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header (case-insensitive lookup).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn parsed_body(&self) -> &RequestBody {
        &self.parsed_body
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Body as JSON, if it was decoded as such.
    pub fn json(&self) -> Option<&Value> {
        match &self.parsed_body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Cookies sent in `Cookie` headers, values percent-decoded.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let value = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                Some((name.to_string(), value))
            })
            .collect()
    }
}
