//! Handler registry
//!
//! Maps handler names to handlers. Built once before the runtime starts and
//! read-only afterwards; there is no removal.
//!
//! # Example
//!
//! ```ignore
//! use bootstrap_runtime::{BoxError, Context, HandlerRegistry, JsonObject};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register_sync("echo", |input: JsonObject, _: &Context| {
//!     Ok::<_, BoxError>(input)
//! });
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxError, Completion, Handler, JsonObject};

/// Registry mapping handler names to handlers
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prebuilt handler.
    ///
    /// Registering a name that is already taken replaces the earlier handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        let name = name.into();
        let kind = handler.kind();

        if let Some(previous) = self.handlers.insert(name.clone(), handler) {
            debug!(
                handler = %name,
                previous = previous.kind().as_str(),
                kind = kind.as_str(),
                "Replaced registered handler"
            );
        } else {
            debug!(handler = %name, kind = kind.as_str(), "Registered handler");
        }

        self
    }

    /// Register a synchronous handler over untyped JSON objects
    pub fn register_sync<F, E>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(JsonObject, &Context) -> Result<JsonObject, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.register(name, Handler::sync_untyped(handler))
    }

    /// Register a callback handler over untyped JSON objects
    pub fn register_async<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(JsonObject, Context, Completion<JsonObject>) + Send + Sync + 'static,
    {
        self.register(name, Handler::async_untyped(handler))
    }

    /// Register a synchronous handler with typed input and output
    pub fn register_typed<F, I, O, E>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(I, &Context) -> Result<O, E> + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        E: Into<BoxError>,
    {
        self.register(name, Handler::sync_typed(handler))
    }

    /// Register a callback handler with typed input and output
    pub fn register_typed_async<F, I, O>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(I, Context, Completion<O>) + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        self.register(name, Handler::async_typed(handler))
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerKind;
    use serde::Deserialize;
    use serde_json::{json, Value};

    fn context() -> Context {
        Context {
            aws_request_id: "abc".to_string(),
            deadline_ms: 0,
            invoked_function_arn: String::new(),
            trace_id: None,
            client_context: None,
            cognito_identity: None,
            memory_limit_in_mb: 128,
            log_group_name: String::new(),
            log_stream_name: String::new(),
            function_name: String::new(),
            function_version: "$LATEST".to_string(),
        }
    }

    fn tagged(tag: &str) -> JsonObject {
        let mut map = JsonObject::new();
        map.insert("tag".to_string(), Value::String(tag.to_string()));
        map
    }

    #[derive(Deserialize)]
    struct Name {
        name: String,
    }

    #[derive(Serialize)]
    struct Greeting {
        message: String,
    }

    #[test]
    fn test_register_each_variant() {
        let mut registry = HandlerRegistry::new();

        registry
            .register_sync("sync", |input: JsonObject, _: &Context| Ok::<_, BoxError>(input))
            .register_async("async", |input: JsonObject, _: Context, done: Completion<JsonObject>| {
                done.complete(input);
            })
            .register_typed("typed", |input: Name, _: &Context| {
                Ok::<_, BoxError>(Greeting {
                    message: format!("hello {}", input.name),
                })
            })
            .register_typed_async("typed_async", |input: Name, _: Context, done: Completion<Greeting>| {
                done.complete(Greeting {
                    message: format!("hello {}", input.name),
                });
            });

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get("sync").unwrap().kind(), HandlerKind::SyncUntyped);
        assert_eq!(registry.get("async").unwrap().kind(), HandlerKind::AsyncUntyped);
        assert_eq!(registry.get("typed").unwrap().kind(), HandlerKind::SyncTyped);
        assert_eq!(registry.get("typed_async").unwrap().kind(), HandlerKind::AsyncTyped);
        assert_eq!(registry.names(), vec!["async", "sync", "typed", "typed_async"]);
    }

    #[test]
    fn test_unknown_handler() {
        let registry = HandlerRegistry::new();

        assert!(registry.is_empty());
        assert!(registry.get("missing").is_none());
        assert!(!registry.contains("missing"));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = HandlerRegistry::new();

        registry.register_sync("handler", |_: JsonObject, _: &Context| Ok::<_, BoxError>(tagged("first")));
        registry.register_async("handler", |_: JsonObject, _: Context, done: Completion<JsonObject>| {
            done.complete(tagged("second"));
        });

        assert_eq!(registry.len(), 1);

        let handler = registry.get("handler").unwrap();
        assert_eq!(handler.kind(), HandlerKind::AsyncUntyped);

        let output = handler.apply(b"{}", &context()).await.unwrap();
        let output: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(output, json!({"tag": "second"}));
    }
}
