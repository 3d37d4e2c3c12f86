use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hyper::Method;
use mockwire::graphql::{parse_document, parse_graphql_request};
use mockwire::handler::{OriginalSource, RequestScope};
use mockwire::{
    CanonicalRequest, Handler, HandlerRegistry, Interceptor, MockResponse, OperationNameMatcher,
    RawRequest,
};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn rest_handlers(count: usize) -> Vec<Handler> {
    (0..count)
        .map(|i| {
            Handler::rest(Method::GET, &format!("/api/v1/endpoint{i}/:id"))
                .unwrap()
                .respond_with(MockResponse::text("ok"))
        })
        .collect()
}

fn canonical(rt: &Runtime, raw: RawRequest) -> Arc<CanonicalRequest> {
    Arc::new(rt.block_on(CanonicalRequest::from_raw(raw)).unwrap())
}

fn bench_rest_matching(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("rest_matching");

    for handler_count in [10, 100, 1000].iter() {
        let handlers = rest_handlers(*handler_count);
        let last = handler_count - 1;
        let request = canonical(
            &rt,
            RawRequest::new("GET", format!("http://localhost/api/v1/endpoint{last}/42")),
        );

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("match_last", handler_count),
            handler_count,
            |b, _| {
                b.iter(|| {
                    let scope = RequestScope::new(Arc::clone(&request));
                    handlers
                        .iter()
                        .find_map(|handler| handler.matches(black_box(&scope)))
                });
            },
        );
    }

    group.finish();
}

fn bench_graphql_parse(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("graphql_parse");
    let query = "query GetUser($id: ID!) { user(id: $id) { id name posts { id title } } }";
    let request = canonical(
        &rt,
        RawRequest::new("POST", "http://localhost/graphql")
            .json(&json!({"query": query, "variables": {"id": "1"}})),
    );

    group.bench_function("classify_document", |b| {
        b.iter(|| parse_document(black_box(query)))
    });
    group.bench_function("parse_request", |b| {
        b.iter(|| parse_graphql_request(black_box(&request)))
    });
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolve");

    let mut handlers = rest_handlers(100);
    handlers.push(
        Handler::graphql(
            mockwire::graphql::OperationType::Query,
            OperationNameMatcher::Exact("GetUser".to_string()),
        )
        .respond_with(MockResponse::json(&json!({"data": {"user": null}}))),
    );
    let interceptor = Interceptor::new(Arc::new(HandlerRegistry::new(handlers)));

    let rest = canonical(
        &rt,
        RawRequest::new("GET", "http://localhost/api/v1/endpoint50/7"),
    );
    let graphql = canonical(
        &rt,
        RawRequest::new("POST", "http://localhost/graphql")
            .json(&json!({"query": "query GetUser { user { id } }"})),
    );

    group.bench_function("rest_middle", |b| {
        b.iter(|| {
            rt.block_on(interceptor.resolve(Arc::clone(&rest), OriginalSource::None))
        })
    });
    group.bench_function("graphql_after_100_rest", |b| {
        b.iter(|| {
            rt.block_on(interceptor.resolve(Arc::clone(&graphql), OriginalSource::None))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_rest_matching, bench_graphql_parse, bench_resolve);
criterion_main!(benches);
