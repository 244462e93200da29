//! Lambda bootstrap runtime
//!
//! Fetches invocations from the Lambda Runtime API, dispatches them to a
//! handler registered at startup and reports the result back.

pub mod client;
pub mod config;
pub mod context;
pub mod handler;
pub mod invocation;
pub mod registry;
pub mod runtime;

pub use client::{HttpRuntimeClient, RuntimeApiClient, TransportError};
pub use config::{ConfigError, EnvSettings, FunctionSettings, RuntimeConfig};
pub use context::Context;
pub use handler::{BoxError, Completion, DispatchResult, Handler, HandlerError, HandlerKind, JsonObject};
pub use invocation::Invocation;
pub use registry::HandlerRegistry;
pub use runtime::{report_init_error, Runtime, RuntimeError};
