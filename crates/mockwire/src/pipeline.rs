//! Resolution pipeline.
//!
//! [`Interceptor`] takes an intercepted request, walks a registry snapshot in
//! priority order, runs the resolver chain of the first matching handler and
//! decides between a mocked response, a bypass and the unhandled policy.

use crate::error::ResolveError;
use crate::handler::{ChainOutcome, OriginalSource, RequestScope, ResolverContext};
use crate::registry::HandlerRegistry;
use crate::request::{CanonicalRequest, RawRequest};
use crate::response::{patch_response, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What to do with a request no handler answered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPolicy {
    /// Forward to the network silently
    #[default]
    Bypass,
    /// Forward to the network and log a warning
    Warn,
    /// Fail without touching the network
    Error,
}

#[derive(Debug, Clone)]
pub struct InterceptorOptions {
    pub on_unhandled: UnhandledPolicy,
    /// Buffer size of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self {
            on_unhandled: UnhandledPolicy::Bypass,
            event_capacity: 256,
        }
    }
}

/// Final decision for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Answer with this response, produced by the named handler
    Mocked {
        response: HttpResponse,
        handler: String,
    },
    /// Let the request through to the network unchanged. `original` holds
    /// the network response when a resolver already fetched it; the hook
    /// must answer with it instead of sending the request again.
    Bypass { original: Option<HttpResponse> },
    /// Fail the request as a network error
    NetworkError(String),
    /// The hook gave up on the request before it was resolved
    Cancelled,
}

/// Observable steps of a request's resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    RequestStart {
        request_id: u64,
        method: String,
        url: String,
    },
    RequestMatch {
        request_id: u64,
        handler: String,
    },
    RequestUnhandled {
        request_id: u64,
        method: String,
        url: String,
    },
    ResponseMocked {
        request_id: u64,
        handler: String,
        status: u16,
    },
    ResponseBypass {
        request_id: u64,
    },
}

/// Resolves intercepted requests against a handler registry.
pub struct Interceptor {
    registry: Arc<HandlerRegistry>,
    options: InterceptorOptions,
    events: broadcast::Sender<LifecycleEvent>,
    next_request_id: AtomicU64,
}

impl Interceptor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_options(registry, InterceptorOptions::default())
    }

    pub fn with_options(registry: Arc<HandlerRegistry>, options: InterceptorOptions) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            registry,
            options,
            events,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &InterceptorOptions {
        &self.options
    }

    /// Receive lifecycle events from now on. Slow receivers lose the oldest
    /// events; resolution never waits for them.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Normalize a raw request and resolve it.
    pub async fn handle(
        &self,
        raw: RawRequest,
        original: OriginalSource,
    ) -> Result<Resolution, ResolveError> {
        let request = CanonicalRequest::from_raw(raw).await?;
        self.resolve(Arc::new(request), original).await
    }

    /// Resolve a request, giving up as soon as `cancel` fires.
    ///
    /// A cancelled resolution never consumes a one-shot handler.
    pub async fn resolve_with_cancel(
        &self,
        request: Arc<CanonicalRequest>,
        original: OriginalSource,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request {} {} cancelled before resolution", request.method(), request.url());
                Ok(Resolution::Cancelled)
            }
            resolution = self.resolve(request.clone(), original) => resolution,
        }
    }

    /// Resolve a request against the current handlers.
    ///
    /// The registry snapshot taken here is used for the whole request.
    pub async fn resolve(
        &self,
        request: Arc<CanonicalRequest>,
        original: OriginalSource,
    ) -> Result<Resolution, ResolveError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.emit(LifecycleEvent::RequestStart {
            request_id,
            method: request.method().to_string(),
            url: request.url().to_string(),
        });

        let handlers = self.registry.snapshot();
        let scope = RequestScope::new(Arc::clone(&request));
        let mut original = original;

        for handler in handlers.iter() {
            if handler.is_once() && handler.is_used() {
                continue;
            }
            let Some(matched) = handler.matches(&scope) else {
                continue;
            };
            debug!("Request {} {} matched {}", request.method(), request.url(), handler);
            self.emit(LifecycleEvent::RequestMatch {
                request_id,
                handler: handler.info().to_string(),
            });

            let mut ctx = ResolverContext::new(
                Arc::clone(&request),
                matched.params,
                matched.graphql,
                original,
            );

            match handler.run(&mut ctx).await {
                ChainOutcome::Response(mock) => {
                    if handler.is_once() && !handler.try_consume() {
                        // Another request consumed it while this one resolved.
                        original = ctx.into_original();
                        continue;
                    }
                    let response = match ctx.original_if_ready() {
                        Some(upstream) => patch_response(mock, upstream),
                        None => mock.into_response(),
                    };
                    self.emit(LifecycleEvent::ResponseMocked {
                        request_id,
                        handler: handler.info().to_string(),
                        status: response.status.as_u16(),
                    });
                    return Ok(Resolution::Mocked {
                        response,
                        handler: handler.info().to_string(),
                    });
                }
                ChainOutcome::Fallthrough => {
                    original = ctx.into_original();
                }
                ChainOutcome::Passthrough => {
                    debug!("Handler {} passed the request through", handler);
                    self.emit(LifecycleEvent::ResponseBypass { request_id });
                    return Ok(Resolution::Bypass {
                        original: ctx.into_original().into_ready(),
                    });
                }
                ChainOutcome::NetworkError(message) => {
                    debug!("Handler {} answered with a network error: {}", handler, message);
                    return Ok(Resolution::NetworkError(message));
                }
                ChainOutcome::NoResponse => {
                    debug!("Handler {} produced no response", handler);
                    return self.unhandled(request_id, &request, ctx.into_original());
                }
            }
        }

        self.unhandled(request_id, &request, original)
    }

    fn unhandled(
        &self,
        request_id: u64,
        request: &CanonicalRequest,
        original: OriginalSource,
    ) -> Result<Resolution, ResolveError> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        self.emit(LifecycleEvent::RequestUnhandled {
            request_id,
            method: method.clone(),
            url: url.clone(),
        });

        match self.options.on_unhandled {
            UnhandledPolicy::Bypass => {
                self.emit(LifecycleEvent::ResponseBypass { request_id });
                Ok(Resolution::Bypass {
                    original: original.into_ready(),
                })
            }
            UnhandledPolicy::Warn => {
                warn!(
                    "Intercepted a request without a matching request handler: {} {}",
                    method, url
                );
                self.emit(LifecycleEvent::ResponseBypass { request_id });
                Ok(Resolution::Bypass {
                    original: original.into_ready(),
                })
            }
            UnhandledPolicy::Error => {
                error!(
                    "Intercepted a request without a matching request handler: {} {}",
                    method, url
                );
                Err(ResolveError::Unhandled { method, url })
            }
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
