use super::{HttpResponse, MockResponse};
use hyper::header::{HeaderName, CONTENT_ENCODING, CONTENT_LENGTH, ETAG};

/// Original headers that describe the original body only.
const BODY_HEADERS: [HeaderName; 3] = [CONTENT_ENCODING, CONTENT_LENGTH, ETAG];

/// Merge a resolver response onto an original network response.
///
/// - status: the mock's when set, else the original's
/// - headers: every header named by the mock replaces all original values of
///   that name; other original headers are kept
/// - body: the mock's when set, else the original body unchanged. A mock body
///   drops the original `content-encoding`, `content-length` and `etag`.
pub fn patch_response(mock: MockResponse, original: &HttpResponse) -> HttpResponse {
    let mut headers = original.headers.clone();
    if mock.body.is_some() {
        for name in &BODY_HEADERS {
            headers.remove(name);
        }
    }
    for name in mock.headers.keys() {
        headers.remove(name);
    }
    for (name, value) in mock.headers.iter() {
        headers.append(name.clone(), value.clone());
    }

    HttpResponse {
        status: mock.status.unwrap_or(original.status),
        headers,
        body: mock.body.unwrap_or_else(|| original.body.clone()),
    }
}
