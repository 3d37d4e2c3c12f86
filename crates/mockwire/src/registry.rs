//! Handler registry.
//!
//! Holds the initial (static) handlers given at startup and the runtime
//! handlers prepended through [`HandlerRegistry::use_handlers`]. Evaluation
//! works on immutable snapshots: a request keeps the list it started with
//! even if the registry is mutated while it is in flight.

use crate::handler::Handler;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// An immutable, ordered view of the registry.
pub type HandlerSnapshot = Arc<Vec<Arc<Handler>>>;

struct RegistryState {
    initial: Vec<Arc<Handler>>,
    runtime: Vec<Arc<Handler>>,
    snapshot: HandlerSnapshot,
}

impl RegistryState {
    fn new(initial: Vec<Arc<Handler>>) -> Self {
        let mut state = Self {
            initial,
            runtime: Vec::new(),
            snapshot: Arc::new(Vec::new()),
        };
        state.rebuild();
        state
    }

    /// Runtime handlers first, then the initial ones.
    fn rebuild(&mut self) {
        let handlers = self
            .runtime
            .iter()
            .chain(self.initial.iter())
            .cloned()
            .collect();
        self.snapshot = Arc::new(handlers);
    }
}

/// Ordered handler list shared by all in-flight requests.
pub struct HandlerRegistry {
    state: RwLock<RegistryState>,
}

impl HandlerRegistry {
    pub fn new(initial: Vec<Handler>) -> Self {
        let initial = initial.into_iter().map(Arc::new).collect();
        Self {
            state: RwLock::new(RegistryState::new(initial)),
        }
    }

    /// The handler list in evaluation order, including consumed one-shot
    /// handlers (the pipeline skips those).
    pub fn snapshot(&self) -> HandlerSnapshot {
        Arc::clone(&self.state.read().snapshot)
    }

    /// Prepend runtime handlers at the highest priority.
    ///
    /// Handlers from the most recent call come first; the order inside one
    /// call is kept.
    pub fn use_handlers(&self, handlers: impl IntoIterator<Item = Handler>) {
        let added: Vec<Arc<Handler>> = handlers.into_iter().map(Arc::new).collect();
        let count = added.len();
        let mut state = self.state.write();
        let runtime = std::mem::take(&mut state.runtime);
        state.runtime = added.into_iter().chain(runtime).collect();
        state.rebuild();
        debug!(
            "Prepended {} runtime handler(s), {} active",
            count,
            state.snapshot.len()
        );
    }

    /// Drop every runtime handler.
    ///
    /// With `Some(next)`, `next` also replaces the initial handlers.
    pub fn reset_handlers(&self, next: Option<Vec<Handler>>) {
        let mut state = self.state.write();
        state.runtime.clear();
        if let Some(next) = next {
            state.initial = next.into_iter().map(Arc::new).collect();
        }
        state.rebuild();
        debug!("Reset handlers, {} active", state.snapshot.len());
    }

    /// Mark every consumed one-shot handler as unused again.
    pub fn restore_handlers(&self) {
        for handler in self.snapshot().iter() {
            if handler.is_once() {
                handler.restore();
            }
        }
    }

    /// Handlers that can still take part in evaluation, in evaluation order.
    pub fn list_handlers(&self) -> Vec<Arc<Handler>> {
        self.snapshot()
            .iter()
            .filter(|handler| !(handler.is_once() && handler.is_used()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
