//! The invocation loop
//!
//! `fetch -> dispatch -> report`, one invocation at a time, until a fatal
//! error. Handler failures are reported to the control plane and the loop
//! continues; transport failures on fetch, unknown handlers and malformed
//! invocations end it.

use bootstrap_core::protocol::TRACE_ID_ENV;
use bootstrap_core::{ErrorDescriptor, ErrorType};
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::client::{HttpRuntimeClient, RuntimeApiClient, TransportError};
use crate::config::{FunctionSettings, RuntimeConfig};
use crate::context::Context;
use crate::handler::DispatchResult;
use crate::registry::HandlerRegistry;

/// Errors that terminate the runtime loop
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime API transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unknown handler: {0}")]
    HandlerNotFound(String),

    #[error("Invocation is missing required header {0}")]
    MissingHeader(&'static str),
}

/// Drives invocations from the control plane through the configured handler
pub struct Runtime<C = HttpRuntimeClient> {
    client: C,
    registry: Arc<HandlerRegistry>,
    handler_name: String,
    function: FunctionSettings,
    propagate_trace_env: bool,
    invocation_count: u64,
}

impl Runtime<HttpRuntimeClient> {
    /// Build a runtime talking HTTP to the configured endpoint
    pub fn from_config(config: RuntimeConfig, registry: HandlerRegistry) -> Result<Self, TransportError> {
        let client = HttpRuntimeClient::new(&config.runtime_api)?;

        Ok(Self::new(client, registry, config.handler_name, config.function)
            .with_trace_env(config.propagate_trace_env))
    }
}

impl<C: RuntimeApiClient> Runtime<C> {
    pub fn new(
        client: C,
        registry: HandlerRegistry,
        handler_name: impl Into<String>,
        function: FunctionSettings,
    ) -> Self {
        Self {
            client,
            registry: Arc::new(registry),
            handler_name: handler_name.into(),
            function,
            propagate_trace_env: false,
            invocation_count: 0,
        }
    }

    /// Also export each invocation's trace id as `_X_AMZN_TRACE_ID`.
    ///
    /// Process-wide state: only valid while one invocation runs at a time.
    pub fn with_trace_env(mut self, enabled: bool) -> Self {
        self.propagate_trace_env = enabled;
        self
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Invocations fetched so far
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count
    }

    /// Process invocations until a fatal error occurs
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        info!(
            handler = %self.handler_name,
            registered = self.registry.len(),
            "Starting runtime loop"
        );

        loop {
            if let Err(e) = self.next_invocation().await {
                error!(error = %e, invocations = self.invocation_count, "Runtime loop terminated");
                return Err(e);
            }
        }
    }

    /// Fetch, dispatch and report exactly one invocation
    pub async fn next_invocation(&mut self) -> Result<(), RuntimeError> {
        let invocation = self.client.next_invocation().await?;

        self.invocation_count += 1;
        info!(counter = self.invocation_count, "Invocation received");

        let registry = Arc::clone(&self.registry);
        let handler = registry
            .get(&self.handler_name)
            .ok_or_else(|| RuntimeError::HandlerNotFound(self.handler_name.clone()))?;

        let context = Context::new(&self.function, &invocation)?;

        if self.propagate_trace_env {
            match &context.trace_id {
                Some(trace_id) => std::env::set_var(TRACE_ID_ENV, trace_id),
                None => std::env::remove_var(TRACE_ID_ENV),
            }
        }

        let span = info_span!(
            "invocation",
            request_id = %context.aws_request_id,
            trace_id = context.trace_id.as_deref().unwrap_or_default(),
            counter = self.invocation_count
        );

        async {
            debug!(kind = handler.kind().as_str(), bytes = invocation.body.len(), "Dispatching");
            let result = handler.apply(&invocation.body, &context).await;
            self.report(&context.aws_request_id, result).await;
        }
        .instrument(span)
        .await;

        Ok(())
    }

    async fn report(&self, request_id: &str, result: DispatchResult) {
        match result {
            Ok(body) => {
                if let Err(e) = self.client.post_response(request_id, body).await {
                    warn!(error = %e, "Failed to post invocation response");
                }
            }
            Err(failure) => {
                let descriptor = failure.descriptor();
                warn!(
                    error = %failure,
                    error_type = descriptor.error_type_str(),
                    "Handler failed"
                );

                if let Err(e) = self.client.post_error(request_id, &descriptor).await {
                    warn!(error = %e, "Failed to post invocation error");
                }
            }
        }
    }
}

/// Best-effort report of a startup failure to `/runtime/init/error`.
///
/// Failures to deliver the report are logged and otherwise ignored; the
/// caller exits either way.
pub async fn report_init_error<C: RuntimeApiClient + ?Sized>(client: &C, error: &dyn Display) {
    let descriptor = ErrorDescriptor::new(error.to_string()).with_type(ErrorType::InitError);

    match client.post_init_error(&descriptor).await {
        Ok(()) => info!(error = %descriptor, "Reported initialization error"),
        Err(e) => warn!(error = %e, "Failed to report initialization error"),
    }
}
