//! GraphQL request recognition.
//!
//! - `extract`: pulls query text and variables out of GET, JSON and multipart requests
//! - `classify`: parses query text into an operation kind and name
//!
//! [`parse_graphql_request`] combines both and never fails: every outcome is a
//! [`GraphQLParse`] value so non-GraphQL handlers keep evaluating the request.

mod classify;
mod extract;

pub use classify::{parse_document, OperationType, ParsedGraphQLQuery};
pub use extract::{extract_graphql_input, GraphQLInput, MultipartOperationsMap};

use crate::error::GraphQLError;
use crate::request::CanonicalRequest;
use serde_json::{Map, Value};
use tracing::{debug, error};

/// A recognized GraphQL operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLRequest {
    /// `None` when the document contains no operation; such a request never
    /// matches a GraphQL handler
    pub operation_type: Option<OperationType>,
    pub operation_name: Option<String>,
    pub query: String,
    pub variables: Map<String, Value>,
}

/// Outcome of recognizing a request as GraphQL.
#[derive(Debug)]
pub enum GraphQLParse {
    /// Not GraphQL-shaped, or the query text is missing or empty
    NotGraphQL,
    /// GraphQL-shaped but invalid; already reported
    Invalid(GraphQLError),
    Parsed(GraphQLRequest),
}

impl GraphQLParse {
    pub fn parsed(&self) -> Option<&GraphQLRequest> {
        match self {
            GraphQLParse::Parsed(request) => Some(request),
            _ => None,
        }
    }
}

/// Recognize and classify the GraphQL operation carried by a request.
///
/// A syntax error is logged once with the request method and public URL.
pub fn parse_graphql_request(request: &CanonicalRequest) -> GraphQLParse {
    let input = match extract_graphql_input(request) {
        Ok(Some(input)) => input,
        Ok(None) => return GraphQLParse::NotGraphQL,
        Err(e) => {
            debug!(
                "Ignoring malformed GraphQL request {} {}: {}",
                request.method(),
                request.public_url(),
                e
            );
            return GraphQLParse::Invalid(e);
        }
    };

    let Some(query) = input.query.filter(|q| !q.trim().is_empty()) else {
        return GraphQLParse::NotGraphQL;
    };

    match parse_document(&query) {
        Ok(parsed) => GraphQLParse::Parsed(GraphQLRequest {
            operation_type: parsed.operation_type,
            operation_name: parsed.operation_name,
            query,
            variables: match input.variables {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            },
        }),
        Err(e) => {
            error!(
                "Failed to intercept a GraphQL request to \"{} {}\": cannot parse query. {}",
                request.method(),
                request.public_url(),
                e
            );
            GraphQLParse::Invalid(e)
        }
    }
}
