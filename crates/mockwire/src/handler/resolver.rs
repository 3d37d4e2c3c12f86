//! Resolvers and the context they run in.
//!
//! A handler owns an ordered chain of resolvers. Each stage receives the same
//! [`ResolverContext`], so a later stage sees (and may change) the in-flight
//! response staged by an earlier one.

use super::path::PathParams;
use crate::error::ResolveError;
use crate::graphql::GraphQLRequest;
use crate::request::CanonicalRequest;
use crate::response::{HttpResponse, MockResponse};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// What a resolver stage decided.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverOutcome {
    /// Terminal: answer with this response
    Respond(MockResponse),
    /// Hand over to the next stage of the chain
    Continue,
    /// Stop this handler and let the next matching handler try
    Fallthrough,
    /// Send the request to the network unchanged
    Passthrough,
    /// Answer with a network error
    NetworkError(String),
}

/// Access to the real network, provided by the interception hook.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &CanonicalRequest) -> anyhow::Result<HttpResponse>;
}

/// Where the original network response for a request comes from.
#[derive(Clone, Default)]
pub enum OriginalSource {
    /// Pure mock: no original response exists
    #[default]
    None,
    /// Already fetched by the hook
    Ready(HttpResponse),
    /// Fetched on first use through the hook's network
    Lazy(Arc<dyn Network>),
}

impl OriginalSource {
    /// The response, if it has already been fetched.
    pub fn into_ready(self) -> Option<HttpResponse> {
        match self {
            OriginalSource::Ready(response) => Some(response),
            _ => None,
        }
    }
}

impl fmt::Debug for OriginalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginalSource::None => write!(f, "None"),
            OriginalSource::Ready(response) => f.debug_tuple("Ready").field(response).finish(),
            OriginalSource::Lazy(_) => write!(f, "Lazy"),
        }
    }
}

/// Everything a resolver can see about the request it answers.
pub struct ResolverContext {
    request: Arc<CanonicalRequest>,
    params: PathParams,
    graphql: Option<GraphQLRequest>,
    original: OriginalSource,
    /// In-flight response staged by earlier stages
    pub response: Option<MockResponse>,
}

impl ResolverContext {
    pub fn new(
        request: Arc<CanonicalRequest>,
        params: PathParams,
        graphql: Option<GraphQLRequest>,
        original: OriginalSource,
    ) -> Self {
        Self {
            request,
            params,
            graphql,
            original,
            response: None,
        }
    }

    pub fn request(&self) -> &CanonicalRequest {
        &self.request
    }

    /// Parameters captured by the handler's path pattern.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The parsed GraphQL operation, for GraphQL handlers.
    pub fn graphql(&self) -> Option<&GraphQLRequest> {
        self.graphql.as_ref()
    }

    /// GraphQL variables; empty for REST handlers.
    pub fn variables(&self) -> Map<String, Value> {
        self.graphql
            .as_ref()
            .map(|op| op.variables.clone())
            .unwrap_or_default()
    }

    /// Stage a response for the following stages, replacing any staged one.
    pub fn stage(&mut self, response: MockResponse) {
        self.response = Some(response);
    }

    /// The original network response, fetching it on first use.
    ///
    /// `Ok(None)` when the hook supplied no original and no network.
    pub async fn original(&mut self) -> Result<Option<&HttpResponse>, ResolveError> {
        let network = match &self.original {
            OriginalSource::Lazy(network) => Some(Arc::clone(network)),
            _ => None,
        };
        if let Some(network) = network {
            let fetched = network
                .fetch(&self.request)
                .await
                .map_err(|e| ResolveError::OriginalFetch(format!("{e:#}")))?;
            self.original = OriginalSource::Ready(fetched);
        }
        Ok(match &self.original {
            OriginalSource::Ready(response) => Some(response),
            _ => None,
        })
    }

    /// The original response if it is already available, without fetching.
    pub fn original_if_ready(&self) -> Option<&HttpResponse> {
        match &self.original {
            OriginalSource::Ready(response) => Some(response),
            _ => None,
        }
    }

    /// Give the original source back, e.g. to the next handler.
    pub(crate) fn into_original(self) -> OriginalSource {
        self.original
    }
}

/// One stage of a handler's resolver chain.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &mut ResolverContext) -> ResolverOutcome;
}

/// Adapter turning a synchronous closure into a [`Resolver`].
pub struct FnResolver<F>(F);

/// Wrap a closure as a resolver stage.
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&mut ResolverContext) -> ResolverOutcome + Send + Sync,
{
    FnResolver(f)
}

#[async_trait]
impl<F> Resolver for FnResolver<F>
where
    F: Fn(&mut ResolverContext) -> ResolverOutcome + Send + Sync,
{
    async fn resolve(&self, ctx: &mut ResolverContext) -> ResolverOutcome {
        (self.0)(ctx)
    }
}

/// A fixed response is the simplest resolver.
#[async_trait]
impl Resolver for MockResponse {
    async fn resolve(&self, _ctx: &mut ResolverContext) -> ResolverOutcome {
        ResolverOutcome::Respond(self.clone())
    }
}

/// Responds with a fixed response after making sure the original is
/// fetched, so the pipeline patches it onto the real response.
pub struct PatchResolver {
    response: MockResponse,
}

impl PatchResolver {
    pub fn new(response: MockResponse) -> Self {
        Self { response }
    }
}

#[async_trait]
impl Resolver for PatchResolver {
    async fn resolve(&self, ctx: &mut ResolverContext) -> ResolverOutcome {
        match ctx.original().await {
            Ok(_) => ResolverOutcome::Respond(self.response.clone()),
            Err(e) => ResolverOutcome::NetworkError(e.to_string()),
        }
    }
}
