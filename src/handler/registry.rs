use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{Handler, HandlerKind, Outcome};
use crate::model::PostDestination;

/// Registry of command handlers, keyed by kind.
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKind, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one of the same kind.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    #[must_use]
    pub fn get(&self, kind: HandlerKind) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&kind)
    }

    /// Registered kinds, in declaration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<HandlerKind> {
        HandlerKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }

    /// Route a request to its handler. An unregistered kind counts as disabled.
    pub async fn dispatch(
        &self,
        kind: HandlerKind,
        args: &[String],
        dest: &PostDestination,
        silent: bool,
    ) -> Outcome {
        let Some(handler) = self.get(kind) else {
            debug!(command = %kind, "No handler registered");
            return Outcome::Disabled;
        };
        handler.handle(args, dest, silent).await
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
