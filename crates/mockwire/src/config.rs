//! Configuration for the interceptor and the hook server.
//!
//! Loaded from YAML or JSON. Handlers declared here become the initial
//! (static) handlers of the registry.
//!
//! ```yaml
//! listen:
//!   port: 8787
//! upstream: https://api.example.com
//! onUnhandledRequest: warn
//! handlers:
//!   - rest: { method: GET, path: /posts/:id }
//!     response: { status: 200, body: { id: 1 } }
//!   - graphql: { operation: query, name: GetUser }
//!     once: true
//!     response: { body: { data: { user: null } } }
//! ```

use crate::error::{ConfigError, HandlerError};
use crate::graphql::OperationType;
use crate::handler::{Handler, MethodMatcher, OperationMatcher, OperationNameMatcher, PatchResolver};
use crate::pipeline::UnhandledPolicy;
use crate::response::MockResponse;
use hyper::StatusCode;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockwireConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    /// Base URL the hook forwards bypassed requests to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(default, rename = "onUnhandledRequest")]
    pub on_unhandled: UnhandledPolicy,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One declarative handler. Exactly one of `rest` and `graphql` is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HandlerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestMatchConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<GraphQLMatchConfig>,
    #[serde(default)]
    pub once: bool,
    /// Patch the response onto the real network response
    #[serde(default)]
    pub patch: bool,
    #[serde(default)]
    pub response: ResponseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestMatchConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLMatchConfig {
    /// Any operation kind when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regular expression over the operation name; ignored when `name` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// A string is sent as text, anything else as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ResponseConfig {
    pub fn to_mock_response(&self) -> Result<MockResponse, HandlerError> {
        let mut response = MockResponse::empty();
        if let Some(code) = self.status {
            let status = StatusCode::from_u16(code).map_err(|_| HandlerError::InvalidStatus(code))?;
            response = response.status(status);
        }

        let has_content_type = self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));
        match &self.body {
            None => {}
            Some(Value::String(text)) => {
                if !has_content_type {
                    response = response.header("content-type", "text/plain");
                }
                response = response.body(text.clone());
            }
            Some(value) => {
                if !has_content_type {
                    response = response.header("content-type", "application/json");
                }
                response = response.body(value.to_string());
            }
        }

        for (name, value) in &self.headers {
            response = response.header(name, value);
        }
        Ok(response)
    }
}

impl HandlerConfig {
    pub fn to_handler(&self) -> Result<Option<Handler>, HandlerError> {
        let handler = match (&self.rest, &self.graphql) {
            (Some(rest), None) => Handler::rest(MethodMatcher::parse(&rest.method)?, &rest.path)?,
            (None, Some(graphql)) => {
                let operation = graphql
                    .operation
                    .map(OperationMatcher::Kind)
                    .unwrap_or(OperationMatcher::Any);
                let name = match (&graphql.name, &graphql.name_pattern) {
                    (Some(name), _) => OperationNameMatcher::Exact(name.clone()),
                    (None, Some(pattern)) => OperationNameMatcher::Pattern(
                        Regex::new(pattern).map_err(|source| HandlerError::InvalidNamePattern {
                            pattern: pattern.clone(),
                            source,
                        })?,
                    ),
                    (None, None) => OperationNameMatcher::Any,
                };
                let handler = Handler::graphql(operation, name);
                match &graphql.endpoint {
                    Some(endpoint) => handler.endpoint(endpoint)?,
                    None => handler,
                }
            }
            _ => return Ok(None),
        };

        let response = self.response.to_mock_response()?;
        let handler = if self.patch {
            handler.resolver(PatchResolver::new(response))
        } else {
            handler.respond_with(response)
        };
        Ok(Some(if self.once { handler.once() } else { handler }))
    }
}

impl MockwireConfig {
    /// Load a config file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: MockwireConfig = if is_json {
            serde_json::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// Handler definitions are checked by [`MockwireConfig::build_handlers`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(upstream) = &self.upstream {
            url::Url::parse(upstream).map_err(|source| ConfigError::InvalidUpstream {
                url: upstream.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Build the static handlers in declared order.
    pub fn build_handlers(&self) -> Result<Vec<Handler>, ConfigError> {
        self.handlers
            .iter()
            .enumerate()
            .map(|(index, config)| match config.to_handler() {
                Ok(Some(handler)) => Ok(handler),
                Ok(None) => Err(ConfigError::AmbiguousHandler { index }),
                Err(source) => Err(ConfigError::Handler { index, source }),
            })
            .collect()
    }
}
