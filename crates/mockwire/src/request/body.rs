//! Request body decoding.
//!
//! The raw bytes of a body are always kept; this module adds the structured
//! view used by matchers: a JSON document or multipart fields keyed by name.

use crate::error::RequestError;
use base64::Engine;
use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::HeaderMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use tracing::debug;

/// Structured view of a request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body bytes at all
    #[default]
    Empty,
    /// Body decoded as JSON
    Json(Value),
    /// `multipart/form-data` fields in arrival order
    Multipart(IndexMap<String, MultipartField>),
    /// Body present but not decodable into a structured form
    Raw,
}

/// A single `multipart/form-data` field.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartField {
    Text(String),
    File(UploadedFile),
}

/// A file part of a multipart body.
///
/// When substituted into GraphQL variables the file is represented as a JSON
/// object (`fileName`, `contentType`, `size`, `content` as base64), which
/// [`UploadedFile::from_value`] turns back into a typed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: usize,
    #[serde(with = "base64_content")]
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: Option<String>, content_type: Option<String>, content: Bytes) -> Self {
        Self {
            file_name,
            content_type,
            size: content.len(),
            content,
        }
    }

    /// JSON representation used inside GraphQL variables.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Recover a file from its JSON representation.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

mod base64_content {
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

impl MultipartField {
    /// Value of this field as it appears in a body field map.
    pub fn to_value(&self) -> Value {
        match self {
            MultipartField::Text(text) => Value::String(text.clone()),
            MultipartField::File(file) => file.to_value(),
        }
    }
}

impl RequestBody {
    /// Decode a body according to its `Content-Type`.
    ///
    /// Undecodable bodies degrade to [`RequestBody::Raw`]; decoding never fails
    /// the whole request.
    pub async fn decode(headers: &HeaderMap, body: &Bytes) -> Self {
        if body.is_empty() {
            return RequestBody::Empty;
        }

        let raw_content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        // Boundaries are case-sensitive; only the media type is compared lowercased.
        let content_type = raw_content_type.to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            return match decode_multipart(raw_content_type, body.clone()).await {
                Ok(fields) => RequestBody::Multipart(fields),
                Err(e) => {
                    debug!("Failed to decode multipart body: {}", e);
                    RequestBody::Raw
                }
            };
        }

        if content_type.is_empty() || content_type.contains("json") {
            if let Ok(value) = serde_json::from_slice::<Value>(body) {
                return RequestBody::Json(value);
            }
        }

        RequestBody::Raw
    }

    /// Top-level fields of the body as a JSON map.
    ///
    /// JSON objects are returned as is; multipart fields are converted with
    /// [`MultipartField::to_value`]. Any other body has no fields.
    pub fn fields(&self) -> Option<Map<String, Value>> {
        match self {
            RequestBody::Json(Value::Object(map)) => Some(map.clone()),
            RequestBody::Multipart(fields) => Some(
                fields
                    .iter()
                    .map(|(name, field)| (name.clone(), field.to_value()))
                    .collect(),
            ),
            _ => None,
        }
    }
}

async fn decode_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<IndexMap<String, MultipartField>, RequestError> {
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = IndexMap::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await?;

        let value = match file_name {
            Some(file_name) => {
                MultipartField::File(UploadedFile::new(Some(file_name), content_type, data))
            }
            None => MultipartField::Text(String::from_utf8_lossy(&data).into_owned()),
        };
        fields.insert(name, value);
    }
    Ok(fields)
}

/// Encode bytes the way [`UploadedFile`] content is encoded.
pub fn encode_content(content: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(content)
}
