//! Error types for the interception core.
//!
//! Every component returns its failures as values. None of these errors is
//! allowed to abort the evaluation of other handlers for the same request.

use thiserror::Error;

/// Errors raised while normalizing an intercepted request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid request method '{0}'")]
    InvalidMethod(String),
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),
}

/// Errors raised while extracting or classifying a GraphQL operation.
///
/// These never leave the GraphQL parse entry point: they turn the request into
/// a non-GraphQL request for matching purposes.
#[derive(Debug, Error)]
pub enum GraphQLError {
    #[error("Invalid JSON in the 'operations' field: {0}")]
    InvalidOperations(#[source] serde_json::Error),

    #[error("Missing 'query' in the 'operations' field")]
    MissingQuery,

    #[error("Given files do not have a key '{key}'")]
    MissingFile { key: String },

    #[error("Property '{segment}' is not in operations (path '{path}')")]
    MissingPath { segment: String, path: String },

    #[error("Invalid path '{0}' in the 'map' field")]
    InvalidMapPath(String),

    #[error("{0}")]
    Syntax(String),
}

/// Errors raised by the resolution pipeline.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unhandled request: {method} {url}")]
    Unhandled { method: String, url: String },

    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("Failed to fetch original response: {0}")]
    OriginalFetch(String),
}

/// Errors raised while building handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid method '{0}'")]
    InvalidMethod(String),
    #[error("Invalid operation name pattern '{pattern}': {source}")]
    InvalidNamePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid status code {0}")]
    InvalidStatus(u16),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid upstream URL '{url}': {source}")]
    InvalidUpstream {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Handler #{index} must declare exactly one of 'rest' or 'graphql'")]
    AmbiguousHandler { index: usize },
    #[error("Handler #{index}: {source}")]
    Handler {
        index: usize,
        #[source]
        source: HandlerError,
    },
}
