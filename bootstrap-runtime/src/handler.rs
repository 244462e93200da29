//! Handler abstraction
//!
//! User code comes in four shapes: untyped (a JSON object in, a JSON object
//! out) or typed (any `DeserializeOwned` in, any `Serialize` out), each either
//! synchronous or completion-callback asynchronous. The shape is resolved once
//! at registration time; every handler then exposes the same
//! [`Handler::apply`] contract: raw input bytes and a context in, encoded
//! output bytes or a [`HandlerError`] out.

use bootstrap_core::{ErrorDescriptor, ErrorType};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::context::Context;

/// Error type accepted from handler code
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Untyped handler payload: a JSON object of dynamically typed values
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Outcome of applying a handler to one invocation
pub type DispatchResult = Result<Bytes, HandlerError>;

/// Per-invocation failures. These are reported to the control plane and never
/// stop the runtime loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to decode input: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("{0}")]
    Handler(BoxError),

    #[error("Failed to encode output: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Handler dropped its completion without resolving it")]
    CompletionDropped,

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Decode(_) => ErrorType::DecodeError,
            Self::Handler(_) => ErrorType::HandlerError,
            Self::Encode(_) => ErrorType::EncodeError,
            Self::CompletionDropped => ErrorType::CompletionDropped,
            Self::Panicked(_) => ErrorType::HandlerPanic,
        }
    }

    /// Descriptor sent to the control plane for this failure
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::new(self.to_string()).with_type(self.error_type())
    }
}

/// The calling convention a handler was registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    SyncUntyped,
    AsyncUntyped,
    SyncTyped,
    AsyncTyped,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncUntyped => "sync-untyped",
            Self::AsyncUntyped => "async-untyped",
            Self::SyncTyped => "sync-typed",
            Self::AsyncTyped => "async-typed",
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::AsyncUntyped | Self::AsyncTyped)
    }
}

/// Single-use completion gate handed to callback-style handlers.
///
/// Resolving consumes the gate, so it can be resolved at most once. It may be
/// moved to another thread or task and resolved from there. Dropping it
/// unresolved fails the invocation with [`HandlerError::CompletionDropped`];
/// holding on to it forever without resolving it hangs the runtime loop.
pub struct Completion<T> {
    resolve: Box<dyn FnOnce(Result<T, BoxError>) + Send>,
}

impl<T> Completion<T> {
    fn new(resolve: impl FnOnce(Result<T, BoxError>) + Send + 'static) -> Self {
        Self {
            resolve: Box::new(resolve),
        }
    }

    /// Finish the invocation with `value` as its output
    pub fn complete(self, value: T) {
        (self.resolve)(Ok(value));
    }

    /// Finish the invocation with a failure
    pub fn fail(self, error: impl Into<BoxError>) {
        (self.resolve)(Err(error.into()));
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

type SyncCall = Box<dyn Fn(&[u8], &Context) -> DispatchResult + Send + Sync>;
type AsyncCall = Box<dyn Fn(&[u8], Context, oneshot::Sender<DispatchResult>) + Send + Sync>;

enum Call {
    Sync(SyncCall),
    Async(AsyncCall),
}

/// A registered handler with its payload types erased
pub struct Handler {
    kind: HandlerKind,
    call: Call,
}

impl Handler {
    /// `(JsonObject, &Context) -> Result<JsonObject, E>`
    pub fn sync_untyped<F, E>(handler: F) -> Self
    where
        F: Fn(JsonObject, &Context) -> Result<JsonObject, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::sync_with_kind(HandlerKind::SyncUntyped, handler)
    }

    /// `(JsonObject, Context, Completion<JsonObject>)`
    pub fn async_untyped<F>(handler: F) -> Self
    where
        F: Fn(JsonObject, Context, Completion<JsonObject>) + Send + Sync + 'static,
    {
        Self::async_with_kind(HandlerKind::AsyncUntyped, handler)
    }

    /// `(I, &Context) -> Result<O, E>`
    pub fn sync_typed<F, I, O, E>(handler: F) -> Self
    where
        F: Fn(I, &Context) -> Result<O, E> + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        E: Into<BoxError>,
    {
        Self::sync_with_kind(HandlerKind::SyncTyped, handler)
    }

    /// `(I, Context, Completion<O>)`
    pub fn async_typed<F, I, O>(handler: F) -> Self
    where
        F: Fn(I, Context, Completion<O>) + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        Self::async_with_kind(HandlerKind::AsyncTyped, handler)
    }

    fn sync_with_kind<F, I, O, E>(kind: HandlerKind, handler: F) -> Self
    where
        F: Fn(I, &Context) -> Result<O, E> + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        E: Into<BoxError>,
    {
        let call = move |input: &[u8], context: &Context| -> DispatchResult {
            let input: I = decode(input)?;
            let output = handler(input, context).map_err(|e| HandlerError::Handler(e.into()))?;
            encode(&output)
        };

        Self {
            kind,
            call: Call::Sync(Box::new(call)),
        }
    }

    fn async_with_kind<F, I, O>(kind: HandlerKind, handler: F) -> Self
    where
        F: Fn(I, Context, Completion<O>) + Send + Sync + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        let call = move |input: &[u8], context: Context, reply: oneshot::Sender<DispatchResult>| {
            let input: I = match decode(input) {
                Ok(input) => input,
                Err(e) => {
                    let _ = reply.send(Err(e));
                    return;
                }
            };

            let completion = Completion::new(move |result: Result<O, BoxError>| {
                let dispatch = result
                    .map_err(HandlerError::Handler)
                    .and_then(|output| encode(&output));
                let _ = reply.send(dispatch);
            });

            handler(input, context, completion);
        };

        Self {
            kind,
            call: Call::Async(Box::new(call)),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Run the handler against one invocation's input.
    ///
    /// Callback handlers are awaited until their completion is resolved or
    /// dropped. No timeout is enforced here. A panic raised while the handler
    /// runs on the calling task becomes [`HandlerError::Panicked`].
    pub async fn apply(&self, input: &[u8], context: &Context) -> DispatchResult {
        match &self.call {
            Call::Sync(call) => panic::catch_unwind(AssertUnwindSafe(|| call(input, context)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload)))),
            Call::Async(call) => {
                let (tx, rx) = oneshot::channel();
                let started = panic::catch_unwind(AssertUnwindSafe(|| call(input, context.clone(), tx)));
                if let Err(payload) = started {
                    return Err(HandlerError::Panicked(panic_message(&*payload)));
                }
                rx.await.unwrap_or(Err(HandlerError::CompletionDropped))
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("kind", &self.kind).finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn decode<I: DeserializeOwned>(input: &[u8]) -> Result<I, HandlerError> {
    serde_json::from_slice(input).map_err(HandlerError::Decode)
}

fn encode<O: Serialize>(output: &O) -> DispatchResult {
    serde_json::to_vec(output)
        .map(Bytes::from)
        .map_err(HandlerError::Encode)
}
