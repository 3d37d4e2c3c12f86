//! Forwarding requests to the real network with reqwest.

use crate::handler::Network;
use crate::request::CanonicalRequest;
use crate::response::HttpResponse;
use anyhow::Context;
use async_trait::async_trait;
use hyper::header::{CONTENT_LENGTH, HOST};
use std::time::Duration;
use tracing::debug;

/// Sends canonical requests to the URL they carry, unchanged.
pub struct UpstreamNetwork {
    client: reqwest::Client,
}

impl UpstreamNetwork {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Forward a request with its method, headers and body as received.
    pub async fn forward(&self, request: &CanonicalRequest) -> anyhow::Result<HttpResponse> {
        debug!("Forwarding {} {}", request.method(), request.url());

        let mut outgoing = self
            .client
            .request(request.method().clone(), request.url().clone());
        // Copy headers (excluding host)
        for (name, value) in request.headers() {
            if name != HOST && name != CONTENT_LENGTH {
                outgoing = outgoing.header(name, value);
            }
        }
        if !request.body().is_empty() {
            outgoing = outgoing.body(request.body().clone());
        }

        let response = outgoing
            .send()
            .await
            .with_context(|| format!("Request to {} failed", request.url()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", request.url()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Network for UpstreamNetwork {
    async fn fetch(&self, request: &CanonicalRequest) -> anyhow::Result<HttpResponse> {
        self.forward(request).await
    }
}
