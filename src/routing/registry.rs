//! Operation handler registry.
//!
//! # Responsibilities
//! - Hold one axum handler per operation key
//! - Turn a registered handler into a method route on demand
//!
//! # Design Decisions
//! - Keys are the `operationId`, or `"METHOD /template"` for operations
//!   without one
//! - Handlers are ordinary axum handlers, so every axum extractor works,
//!   alongside [`RequestParams`](crate::middleware::RequestParams) and
//!   [`ParsedBody`](crate::middleware::ParsedBody) extensions

use std::collections::HashMap;
use std::fmt;

use axum::handler::Handler;
use axum::routing::{on, MethodFilter, MethodRouter};

type RouteFactory = Box<dyn Fn(MethodFilter) -> MethodRouter + Send + Sync>;

/// Handlers keyed by operation.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, RouteFactory>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("keys", &keys).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the operation `key`, replacing any earlier one.
    pub fn register<H, T>(&mut self, key: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler<T, ()> + Sync,
        T: 'static,
    {
        let key = key.into();
        if self.handlers.contains_key(&key) {
            tracing::warn!(operation = %key, "Replacing previously registered handler");
        }
        self.handlers
            .insert(key, Box::new(move |filter| on(filter, handler.clone())));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Method route for `key` restricted to `filter`.
    pub(crate) fn route(&self, key: &str, filter: MethodFilter) -> Option<MethodRouter> {
        self.handlers.get(key).map(|factory| factory(filter))
    }
}
