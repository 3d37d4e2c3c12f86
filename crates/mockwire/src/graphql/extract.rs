//! GraphQL operation extraction.
//!
//! Recognizes the three transport conventions for GraphQL over HTTP:
//! - `GET` with `query` and JSON-encoded `variables` search parameters
//! - `POST` with a JSON body `{ query, variables }`
//! - `POST` with the multipart upload convention
//!   `{ operations, map, <file key>... }`

use crate::error::GraphQLError;
use crate::request::CanonicalRequest;
use hyper::Method;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

/// Query text and variables pulled out of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQLInput {
    pub query: Option<String>,
    pub variables: Option<Value>,
}

/// File key to the dot-paths the file is substituted at.
pub type MultipartOperationsMap = IndexMap<String, Vec<String>>;

/// Extract the GraphQL input from a request.
///
/// `Ok(None)` means the request is not GraphQL-shaped; `Err` means it is, but
/// its multipart mapping is invalid.
pub fn extract_graphql_input(
    request: &CanonicalRequest,
) -> Result<Option<GraphQLInput>, GraphQLError> {
    match *request.method() {
        Method::GET => Ok(extract_from_query(request)),
        Method::POST => {
            let Some(fields) = request.parsed_body().fields() else {
                return Ok(None);
            };
            if let Some(query) = fields.get("query") {
                return Ok(Some(GraphQLInput {
                    query: query.as_str().map(str::to_owned),
                    variables: fields.get("variables").cloned(),
                }));
            }
            match fields.get("operations") {
                Some(operations) => extract_multipart(operations, &fields).map(Some),
                None => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn extract_from_query(request: &CanonicalRequest) -> Option<GraphQLInput> {
    let query = request.query_param("query")?;
    let variables = request
        .query_param("variables")
        .and_then(|raw| match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Ignoring undecodable GraphQL variables: {}", e);
                None
            }
        });

    Some(GraphQLInput {
        query: Some(query.to_string()),
        variables,
    })
}

fn extract_multipart(
    operations: &Value,
    fields: &Map<String, Value>,
) -> Result<GraphQLInput, GraphQLError> {
    let mut operations = match operations {
        Value::String(raw) => serde_json::from_str(raw).map_err(GraphQLError::InvalidOperations)?,
        other => other.clone(),
    };

    let query = operations
        .get("query")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(GraphQLError::MissingQuery)?;

    let map = decode_map(fields.get("map"));
    let files: Map<String, Value> = fields
        .iter()
        .filter(|(name, _)| name.as_str() != "operations" && name.as_str() != "map")
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for (key, paths) in &map {
        let file = files
            .get(key)
            .ok_or_else(|| GraphQLError::MissingFile { key: key.clone() })?;
        for path in paths {
            let segments: Vec<&str> = path.split('.').collect();
            assign_at_path(&mut operations, &segments, path, file.clone())?;
        }
    }

    Ok(GraphQLInput {
        query: Some(query),
        variables: operations.get("variables").cloned(),
    })
}

fn decode_map(raw: Option<&Value>) -> MultipartOperationsMap {
    let decoded = match raw {
        Some(Value::String(text)) => serde_json::from_str(text),
        Some(value) => serde_json::from_value(value.clone()),
        None => return MultipartOperationsMap::new(),
    };
    decoded.unwrap_or_else(|e| {
        debug!("Ignoring undecodable multipart 'map' field: {}", e);
        MultipartOperationsMap::new()
    })
}

/// Write `value` at a dot-path under `node`.
///
/// Every segment but the last must already exist as an object key or array
/// index; the last segment is created or overwritten.
fn assign_at_path(
    node: &mut Value,
    segments: &[&str],
    path: &str,
    value: Value,
) -> Result<(), GraphQLError> {
    let missing = |segment: &str| GraphQLError::MissingPath {
        segment: segment.to_string(),
        path: path.to_string(),
    };

    match segments {
        [] => Err(GraphQLError::InvalidMapPath(path.to_string())),
        [last] => match node {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get_mut(index))
                    .ok_or_else(|| missing(last))?;
                *slot = value;
                Ok(())
            }
            _ => Err(missing(last)),
        },
        [head, rest @ ..] => {
            let child = match node {
                Value::Object(map) => map.get_mut(*head),
                Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
                _ => None,
            }
            .filter(|child| child.is_object() || child.is_array())
            .ok_or_else(|| missing(head))?;
            assign_at_path(child, rest, path, value)
        }
    }
}
