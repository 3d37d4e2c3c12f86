//! Request handlers: a matcher plus a chain of resolvers.
//!
//! - `path`: path pattern compilation for REST handlers and GraphQL endpoints
//! - `resolver`: the `Resolver` trait, its context and outcomes
//!
//! A [`Handler`] matches either a REST request (method and path) or a GraphQL
//! operation (operation kind and optional name). Matching is purely
//! structural; handler order alone decides priority.

mod path;
mod resolver;

pub use path::{PathParams, PathPattern};
pub use resolver::{
    resolver_fn, FnResolver, Network, OriginalSource, PatchResolver, Resolver, ResolverContext,
    ResolverOutcome,
};

use crate::error::HandlerError;
use crate::graphql::{parse_graphql_request, GraphQLParse, GraphQLRequest, OperationType};
use crate::request::CanonicalRequest;
use crate::response::MockResponse;
use hyper::Method;
use regex::Regex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// HTTP method a REST handler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    Exact(Method),
}

impl MethodMatcher {
    /// Parse a method name; `*` and `ALL` accept any method.
    pub fn parse(method: &str) -> Result<Self, HandlerError> {
        let upper = method.trim().to_ascii_uppercase();
        match upper.as_str() {
            "*" | "ALL" => Ok(MethodMatcher::Any),
            _ => Method::from_bytes(upper.as_bytes())
                .map(MethodMatcher::Exact)
                .map_err(|_| HandlerError::InvalidMethod(method.to_string())),
        }
    }

    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::Exact(expected) => expected == method,
        }
    }
}

impl From<Method> for MethodMatcher {
    fn from(method: Method) -> Self {
        MethodMatcher::Exact(method)
    }
}

/// GraphQL operation kind a handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMatcher {
    Any,
    Kind(OperationType),
}

impl From<OperationType> for OperationMatcher {
    fn from(kind: OperationType) -> Self {
        OperationMatcher::Kind(kind)
    }
}

/// GraphQL operation name a handler accepts.
#[derive(Debug, Clone)]
pub enum OperationNameMatcher {
    Any,
    /// Case-sensitive equality
    Exact(String),
    Pattern(Regex),
}

impl OperationNameMatcher {
    fn matches(&self, name: Option<&str>) -> bool {
        match self {
            OperationNameMatcher::Any => true,
            OperationNameMatcher::Exact(expected) => name == Some(expected.as_str()),
            OperationNameMatcher::Pattern(regex) => name.is_some_and(|n| regex.is_match(n)),
        }
    }
}

/// What a handler matches on.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    Rest {
        method: MethodMatcher,
        path: PathPattern,
    },
    GraphQL {
        operation: OperationMatcher,
        name: OperationNameMatcher,
        /// Restricts the handler to one endpoint when set
        endpoint: Option<PathPattern>,
    },
}

/// Per-request state shared by all matchers evaluating that request.
///
/// The GraphQL parse runs at most once, on the first GraphQL handler that
/// asks for it.
pub struct RequestScope {
    request: Arc<CanonicalRequest>,
    graphql: OnceLock<GraphQLParse>,
}

impl RequestScope {
    pub fn new(request: Arc<CanonicalRequest>) -> Self {
        Self {
            request,
            graphql: OnceLock::new(),
        }
    }

    pub fn request(&self) -> &Arc<CanonicalRequest> {
        &self.request
    }

    pub fn graphql(&self) -> &GraphQLParse {
        self.graphql
            .get_or_init(|| parse_graphql_request(&self.request))
    }
}

/// Data produced by a successful match.
#[derive(Debug, Clone, Default)]
pub struct HandlerMatch {
    pub params: PathParams,
    pub graphql: Option<GraphQLRequest>,
}

/// Result of running a handler's resolver chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    Response(MockResponse),
    /// Every stage continued and nothing was staged
    NoResponse,
    Fallthrough,
    Passthrough,
    NetworkError(String),
}

/// A matcher plus an ordered resolver chain.
pub struct Handler {
    info: String,
    kind: HandlerKind,
    resolvers: Vec<Arc<dyn Resolver>>,
    once: bool,
    used: AtomicBool,
}

impl Handler {
    /// A REST handler for a method and path pattern.
    pub fn rest(method: impl Into<MethodMatcher>, path: &str) -> Result<Self, HandlerError> {
        let method = method.into();
        let path = PathPattern::compile(path)?;
        let info = match &method {
            MethodMatcher::Any => format!("all {path}"),
            MethodMatcher::Exact(m) => format!("{m} {path}"),
        };
        Ok(Self::new(info, HandlerKind::Rest { method, path }))
    }

    /// A GraphQL handler for an operation kind and name.
    pub fn graphql(operation: impl Into<OperationMatcher>, name: OperationNameMatcher) -> Self {
        let operation = operation.into();
        let kind = match operation {
            OperationMatcher::Any => "operation".to_string(),
            OperationMatcher::Kind(kind) => kind.to_string(),
        };
        let info = match &name {
            OperationNameMatcher::Any => format!("{kind} (any)"),
            OperationNameMatcher::Exact(name) => format!("{kind} {name}"),
            OperationNameMatcher::Pattern(regex) => format!("{kind} /{}/", regex.as_str()),
        };
        Self::new(
            info,
            HandlerKind::GraphQL {
                operation,
                name,
                endpoint: None,
            },
        )
    }

    fn new(info: String, kind: HandlerKind) -> Self {
        Self {
            info,
            kind,
            resolvers: Vec::new(),
            once: false,
            used: AtomicBool::new(false),
        }
    }

    /// Restrict a GraphQL handler to one endpoint. No effect on REST handlers.
    pub fn endpoint(mut self, pattern: &str) -> Result<Self, HandlerError> {
        if let HandlerKind::GraphQL { endpoint, .. } = &mut self.kind {
            let compiled = PathPattern::compile(pattern)?;
            self.info = format!("{} ({compiled})", self.info);
            *endpoint = Some(compiled);
        }
        Ok(self)
    }

    /// Append a stage to the resolver chain.
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Append a stage answering with a fixed response.
    pub fn respond_with(self, response: MockResponse) -> Self {
        self.resolver(response)
    }

    /// Consume this handler after its first produced response.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Human-readable description, e.g. `GET /posts` or `query GetUser`.
    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Whether this one-shot handler has already been consumed.
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }

    /// Mark a one-shot handler consumed. Only one caller ever wins.
    pub(crate) fn try_consume(&self) -> bool {
        self.used
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn restore(&self) {
        self.used.store(false, Ordering::SeqCst);
    }

    /// Decide whether this handler applies to a request.
    pub fn matches(&self, scope: &RequestScope) -> Option<HandlerMatch> {
        let request = scope.request();
        match &self.kind {
            HandlerKind::Rest { method, path } => {
                if !method.matches(request.method()) {
                    return None;
                }
                let params = path.matches(request)?;
                Some(HandlerMatch {
                    params,
                    graphql: None,
                })
            }
            HandlerKind::GraphQL {
                operation,
                name,
                endpoint,
            } => {
                let params = match endpoint {
                    Some(endpoint) => endpoint.matches(request)?,
                    None => PathParams::new(),
                };
                let parsed = scope.graphql().parsed()?;
                let kind = parsed.operation_type?;
                if let OperationMatcher::Kind(expected) = operation {
                    if *expected != kind {
                        return None;
                    }
                }
                if !name.matches(parsed.operation_name.as_deref()) {
                    return None;
                }
                Some(HandlerMatch {
                    params,
                    graphql: Some(parsed.clone()),
                })
            }
        }
    }

    /// Run the resolver chain in declared order.
    ///
    /// Each stage completes before the next starts. The first terminal
    /// outcome ends the chain; if every stage continues, the staged response
    /// (if any) is the result.
    pub async fn run(&self, ctx: &mut ResolverContext) -> ChainOutcome {
        for resolver in &self.resolvers {
            match resolver.resolve(ctx).await {
                ResolverOutcome::Respond(response) => return ChainOutcome::Response(response),
                ResolverOutcome::Continue => continue,
                ResolverOutcome::Fallthrough => return ChainOutcome::Fallthrough,
                ResolverOutcome::Passthrough => return ChainOutcome::Passthrough,
                ResolverOutcome::NetworkError(message) => {
                    return ChainOutcome::NetworkError(message)
                }
            }
        }
        match ctx.response.take() {
            Some(response) => ChainOutcome::Response(response),
            None => ChainOutcome::NoResponse,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("info", &self.info)
            .field("kind", &self.kind)
            .field("resolvers", &self.resolvers.len())
            .field("once", &self.once)
            .field("used", &self.is_used())
            .finish()
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RawRequest;
    use hyper::StatusCode;
    use serde_json::json;

    async fn scope(raw: RawRequest) -> RequestScope {
        let request = CanonicalRequest::from_raw(raw).await.unwrap();
        RequestScope::new(Arc::new(request))
    }

    fn graphql_post(query: &str) -> RawRequest {
        RawRequest::new("POST", "http://api.test/graphql").json(&json!({ "query": query }))
    }

    fn context(scope: &RequestScope, matched: HandlerMatch) -> ResolverContext {
        ResolverContext::new(
            Arc::clone(scope.request()),
            matched.params,
            matched.graphql,
            OriginalSource::None,
        )
    }

    #[test]
    fn test_method_matcher_parse() {
        assert_eq!(MethodMatcher::parse("get").unwrap(), MethodMatcher::Exact(Method::GET));
        assert_eq!(MethodMatcher::parse("*").unwrap(), MethodMatcher::Any);
        assert_eq!(MethodMatcher::parse("all").unwrap(), MethodMatcher::Any);
        assert!(MethodMatcher::parse("BAD METHOD").is_err());
    }

    #[tokio::test]
    async fn test_rest_match_ignores_query_string() {
        let handler = Handler::rest(Method::GET, "/posts/:id").unwrap();
        let matched = handler
            .matches(&scope(RawRequest::new("GET", "http://api.test/posts/5?expand=true")).await)
            .unwrap();
        assert_eq!(matched.params.get("id").map(String::as_str), Some("5"));
        assert!(matched.graphql.is_none());
    }

    #[tokio::test]
    async fn test_rest_method_mismatch() {
        let handler = Handler::rest(Method::GET, "/posts").unwrap();
        assert!(handler
            .matches(&scope(RawRequest::new("POST", "http://api.test/posts")).await)
            .is_none());

        let any = Handler::rest(MethodMatcher::Any, "/posts").unwrap();
        assert!(any
            .matches(&scope(RawRequest::new("PATCH", "http://api.test/posts")).await)
            .is_some());
    }

    #[tokio::test]
    async fn test_graphql_named_match() {
        let handler = Handler::graphql(
            OperationType::Query,
            OperationNameMatcher::Exact("GetUser".to_string()),
        );
        let s = scope(graphql_post("query GetUser { user { id } }")).await;
        let matched = handler.matches(&s).unwrap();
        assert_eq!(
            matched.graphql.unwrap().operation_name.as_deref(),
            Some("GetUser")
        );

        let lower = scope(graphql_post("query getuser { user { id } }")).await;
        assert!(handler.matches(&lower).is_none());

        let mutation = scope(graphql_post("mutation GetUser { x }")).await;
        assert!(handler.matches(&mutation).is_none());
    }

    #[tokio::test]
    async fn test_graphql_any_name_and_anonymous() {
        let handler = Handler::graphql(OperationType::Query, OperationNameMatcher::Any);
        assert!(handler
            .matches(&scope(graphql_post("{ __typename }")).await)
            .is_some());

        let named = Handler::graphql(
            OperationType::Query,
            OperationNameMatcher::Exact("GetUser".to_string()),
        );
        assert!(named
            .matches(&scope(graphql_post("{ __typename }")).await)
            .is_none());
    }

    #[tokio::test]
    async fn test_graphql_name_pattern_and_any_operation() {
        let handler = Handler::graphql(
            OperationMatcher::Any,
            OperationNameMatcher::Pattern(Regex::new("^Get").unwrap()),
        );
        assert!(handler
            .matches(&scope(graphql_post("mutation GetOrCreate { x }")).await)
            .is_some());
        assert!(handler
            .matches(&scope(graphql_post("query ListUsers { x }")).await)
            .is_none());
    }

    #[tokio::test]
    async fn test_graphql_never_matches_invalid_or_rest() {
        let handler = Handler::graphql(OperationMatcher::Any, OperationNameMatcher::Any);
        assert!(handler
            .matches(&scope(graphql_post("query Broken {")).await)
            .is_none());
        assert!(handler
            .matches(&scope(RawRequest::new("GET", "http://api.test/posts")).await)
            .is_none());
        assert!(handler
            .matches(&scope(graphql_post("fragment F on User { id }")).await)
            .is_none());
    }

    #[tokio::test]
    async fn test_graphql_endpoint_scoping() {
        let handler = Handler::graphql(OperationType::Query, OperationNameMatcher::Any)
            .endpoint("https://github.test/graphql")
            .unwrap();
        assert_eq!(handler.info(), "query (any) (https://github.test/graphql)");

        let other = RawRequest::new("POST", "http://api.test/graphql")
            .json(&json!({"query": "{ a }"}));
        assert!(handler.matches(&scope(other).await).is_none());

        let github = RawRequest::new("POST", "https://github.test/graphql")
            .json(&json!({"query": "{ a }"}));
        assert!(handler.matches(&scope(github).await).is_some());
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_response() {
        let handler = Handler::rest(Method::GET, "/x")
            .unwrap()
            .resolver(resolver_fn(|ctx: &mut ResolverContext| {
                ctx.stage(MockResponse::empty().header("x-stage", "1"));
                ResolverOutcome::Continue
            }))
            .resolver(resolver_fn(|ctx: &mut ResolverContext| {
                let staged = ctx.response.take().unwrap_or_default();
                ResolverOutcome::Respond(staged.status(StatusCode::CREATED))
            }))
            .resolver(resolver_fn(|_: &mut ResolverContext| {
                panic!("stages after a response must not run")
            }));

        let s = scope(RawRequest::new("GET", "http://api.test/x")).await;
        let matched = handler.matches(&s).unwrap();
        let mut ctx = context(&s, matched);

        match handler.run(&mut ctx).await {
            ChainOutcome::Response(response) => {
                assert_eq!(response.status, Some(StatusCode::CREATED));
                assert_eq!(
                    response.headers.get("x-stage").and_then(|v| v.to_str().ok()),
                    Some("1")
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chain_returns_staged_response_or_nothing() {
        let staged = Handler::rest(Method::GET, "/x")
            .unwrap()
            .resolver(resolver_fn(|ctx: &mut ResolverContext| {
                ctx.stage(MockResponse::text("staged"));
                ResolverOutcome::Continue
            }));
        let silent = Handler::rest(Method::GET, "/x")
            .unwrap()
            .resolver(resolver_fn(|_: &mut ResolverContext| ResolverOutcome::Continue));

        let s = scope(RawRequest::new("GET", "http://api.test/x")).await;

        let mut ctx = context(&s, staged.matches(&s).unwrap());
        assert_eq!(
            staged.run(&mut ctx).await,
            ChainOutcome::Response(MockResponse::text("staged"))
        );

        let mut ctx = context(&s, silent.matches(&s).unwrap());
        assert_eq!(silent.run(&mut ctx).await, ChainOutcome::NoResponse);
    }

    #[test]
    fn test_try_consume_only_once() {
        let handler = Handler::rest(Method::GET, "/x").unwrap().once();
        assert!(handler.is_once());
        assert!(handler.try_consume());
        assert!(!handler.try_consume());
        assert!(handler.is_used());
        handler.restore();
        assert!(!handler.is_used());
    }
}
