//! End-to-end tests for the interception hook: a real upstream (wiremock),
//! the hook server on an ephemeral port, and a reqwest client.

use assert_json_diff::assert_json_eq;
use hyper::Method;
use mockwire::graphql::OperationType;
use mockwire::handler::{resolver_fn, PatchResolver, Resolver, ResolverContext};
use mockwire::hook::{MockwireServer, NETWORK_ERROR_HEADER, UNHANDLED_HEADER};
use mockwire::{
    Handler, HandlerRegistry, Interceptor, InterceptorOptions, MockResponse, OperationNameMatcher,
    ResolverOutcome, UnhandledPolicy,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: Arc<MockwireServer>,
    base: String,
    client: reqwest::Client,
}

impl Harness {
    async fn start(handlers: Vec<Handler>, upstream: &MockServer, policy: UnhandledPolicy) -> Self {
        let interceptor = Arc::new(Interceptor::with_options(
            Arc::new(HandlerRegistry::new(handlers)),
            InterceptorOptions {
                on_unhandled: policy,
                ..Default::default()
            },
        ));
        let upstream = Url::parse(&upstream.uri()).unwrap();
        let server = Arc::new(MockwireServer::new(interceptor, Some(upstream)).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&server).serve(listener));

        Self {
            server,
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

async fn upstream_hits(upstream: &MockServer) -> usize {
    upstream
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_mocked_response_never_reaches_upstream() {
    let upstream = MockServer::start().await;
    let harness = Harness::start(
        vec![Handler::rest(Method::GET, "/posts/:id")
            .unwrap()
            .resolver(resolver_fn(|ctx: &mut ResolverContext| {
                let id = ctx.param("id").unwrap_or_default().to_string();
                ResolverOutcome::Respond(MockResponse::json(&json!({"id": id})))
            }))],
        &upstream,
        UnhandledPolicy::Error,
    )
    .await;

    let response = harness
        .client
        .get(harness.url("/posts/42?expand=1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_json_eq!(
        response.json::<serde_json::Value>().await.unwrap(),
        json!({"id": "42"})
    );
    assert_eq!(upstream_hits(&upstream).await, 0);
}

#[tokio::test]
async fn test_unhandled_request_is_forwarded_unchanged() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-test", "1"))
        .and(body_string("payload"))
        .respond_with(ResponseTemplate::new(201).set_body_string("from upstream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let harness = Harness::start(Vec::new(), &upstream, UnhandledPolicy::Bypass).await;
    let response = harness
        .client
        .post(harness.url("/echo"))
        .header("x-test", "1")
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.text().await.unwrap(), "from upstream");
}

#[tokio::test]
async fn test_strict_mode_rejects_without_network() {
    let upstream = MockServer::start().await;
    let harness = Harness::start(Vec::new(), &upstream, UnhandledPolicy::Error).await;

    let response = harness
        .client
        .get(harness.url("/missing"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(response.headers()[UNHANDLED_HEADER], "true");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["url"], format!("{}/missing", upstream.uri()));
    assert_eq!(upstream_hits(&upstream).await, 0);
}

#[tokio::test]
async fn test_patch_merges_onto_upstream_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-powered-by", "orig")
                .set_body_json(json!({"other": true})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let harness = Harness::start(
        vec![Handler::rest(Method::GET, "/user")
            .unwrap()
            .resolver(PatchResolver::new(
                MockResponse::empty()
                    .header("x-custom", "A")
                    .header("content-type", "application/json")
                    .body(json!({"id": 101}).to_string()),
            ))],
        &upstream,
        UnhandledPolicy::Error,
    )
    .await;

    let response = harness.client.get(harness.url("/user")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-custom"], "A");
    assert_eq!(response.headers()["x-powered-by"], "orig");
    assert_json_eq!(
        response.json::<serde_json::Value>().await.unwrap(),
        json!({"id": 101})
    );
}

#[tokio::test]
async fn test_graphql_operation_is_mocked_and_others_bypass() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"real": true}})))
        .mount(&upstream)
        .await;

    let harness = Harness::start(
        vec![Handler::graphql(
            OperationType::Query,
            OperationNameMatcher::Exact("GetUser".to_string()),
        )
        .respond_with(MockResponse::json(&json!({"data": {"user": {"id": "1"}}})))],
        &upstream,
        UnhandledPolicy::Bypass,
    )
    .await;

    let mocked = harness
        .client
        .post(harness.url("/graphql"))
        .json(&json!({"query": "query GetUser { user { id } }"}))
        .send()
        .await
        .unwrap();
    assert_json_eq!(
        mocked.json::<serde_json::Value>().await.unwrap(),
        json!({"data": {"user": {"id": "1"}}})
    );

    let bypassed = harness
        .client
        .post(harness.url("/graphql"))
        .json(&json!({"query": "query ListUsers { users { id } }"}))
        .send()
        .await
        .unwrap();
    assert_json_eq!(
        bypassed.json::<serde_json::Value>().await.unwrap(),
        json!({"data": {"real": true}})
    );
}

#[tokio::test]
async fn test_runtime_once_handler_then_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flag"))
        .respond_with(ResponseTemplate::new(200).set_body_string("real"))
        .mount(&upstream)
        .await;

    let harness = Harness::start(Vec::new(), &upstream, UnhandledPolicy::Bypass).await;
    harness
        .server
        .interceptor()
        .registry()
        .use_handlers(vec![Handler::rest(Method::GET, "/flag")
            .unwrap()
            .once()
            .respond_with(MockResponse::text("mocked"))]);

    let first = harness.client.get(harness.url("/flag")).send().await.unwrap();
    assert_eq!(first.text().await.unwrap(), "mocked");

    let second = harness.client.get(harness.url("/flag")).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), "real");
}

#[tokio::test]
async fn test_resolver_network_error() {
    let upstream = MockServer::start().await;
    let harness = Harness::start(
        vec![Handler::rest(Method::GET, "/down")
            .unwrap()
            .resolver(resolver_fn(|_: &mut ResolverContext| {
                ResolverOutcome::NetworkError("simulated outage".to_string())
            }))],
        &upstream,
        UnhandledPolicy::Error,
    )
    .await;

    let response = harness.client.get(harness.url("/down")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(response.headers()[NETWORK_ERROR_HEADER], "simulated outage");
}

struct FetchThenPassthrough;

#[async_trait::async_trait]
impl Resolver for FetchThenPassthrough {
    async fn resolve(&self, ctx: &mut ResolverContext) -> ResolverOutcome {
        let _ = ctx.original().await;
        ResolverOutcome::Passthrough
    }
}

#[tokio::test]
async fn test_passthrough_after_fetch_reaches_upstream_once() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .mount(&upstream)
        .await;

    let harness = Harness::start(
        vec![Handler::rest(Method::POST, "/orders")
            .unwrap()
            .resolver(FetchThenPassthrough)],
        &upstream,
        UnhandledPolicy::Error,
    )
    .await;

    let response = harness
        .client
        .post(harness.url("/orders"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.text().await.unwrap(), "created");
    assert_eq!(upstream_hits(&upstream).await, 1);
}
