//! Mockwire: request interception core.
//!
//! Resolves intercepted HTTP requests against an ordered list of REST and
//! GraphQL handlers, with passthrough, strict unhandled-request handling and
//! patching of mocked responses onto real network responses.
//!
//! - `request`: canonical request model
//! - `graphql`: GraphQL operation extraction and classification
//! - `handler`: handlers, matchers and resolver chains
//! - `registry`: initial and runtime handlers, snapshots
//! - `pipeline`: the resolution pipeline ([`Interceptor`])
//! - `response`: mock and network responses, patching
//! - `config`: YAML/JSON configuration
//! - `hook`: reference interception hook (HTTP server + forwarding)

pub mod config;
pub mod error;
pub mod graphql;
pub mod handler;
pub mod hook;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod response;

pub use error::{ConfigError, GraphQLError, HandlerError, RequestError, ResolveError};
pub use handler::{Handler, MethodMatcher, OperationMatcher, OperationNameMatcher, ResolverOutcome};
pub use pipeline::{Interceptor, InterceptorOptions, LifecycleEvent, Resolution, UnhandledPolicy};
pub use registry::HandlerRegistry;
pub use request::{CanonicalRequest, RawRequest};
pub use response::{HttpResponse, MockResponse};
