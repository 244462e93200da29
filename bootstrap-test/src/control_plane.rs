//! Mock Lambda Runtime API server
//!
//! Implements the Runtime API routes a bootstrap talks to. Invocations are
//! queued by the test and delivered via long-polling on
//! `/runtime/invocation/next`; everything the runtime posts back is recorded.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bootstrap_core::protocol::{
    HEADER_DEADLINE_MS, HEADER_ERROR_TYPE, HEADER_FUNCTION_ARN, HEADER_REQUEST_ID,
    HEADER_TRACE_ID, INIT_ERROR_PATH, NEXT_INVOCATION_PATH,
};
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum TestError {
    #[error("Failed to start mock control plane: {0}")]
    StartFailed(#[from] std::io::Error),

    #[error("Timed out waiting for {expected} reports, got {received}")]
    Timeout { expected: usize, received: usize },
}

/// An invocation waiting to be fetched by the runtime
#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub request_id: String,
    pub function_arn: String,
    pub payload: Bytes,
    pub deadline_ms: i64,
    pub trace_id: Option<String>,
}

impl PendingInvocation {
    pub fn new(request_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            request_id: request_id.into(),
            function_arn: "arn:aws:lambda:us-east-1:000000000000:function:test".to_string(),
            payload: payload.into(),
            deadline_ms: 0,
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = deadline_ms;
        self
    }
}

/// Something the runtime posted back
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Response {
        request_id: String,
        body: Bytes,
    },
    Error {
        request_id: String,
        error_type: Option<String>,
        body: Bytes,
    },
    InitError {
        error_type: Option<String>,
        body: Bytes,
    },
}

impl Report {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Response { request_id, .. } | Self::Error { request_id, .. } => Some(request_id),
            Self::InitError { .. } => None,
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Self::Response { body, .. } | Self::Error { body, .. } | Self::InitError { body, .. } => body,
        }
    }

    /// Body decoded as JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(self.body()).ok()
    }
}

struct ControlPlaneState {
    invocation_rx: Mutex<mpsc::UnboundedReceiver<PendingInvocation>>,
    /// Request id of the invocation handed out last
    current_invocation: Mutex<Option<String>>,
    reports: Mutex<Vec<Report>>,
    report_notify: Notify,
    fail_reports: AtomicBool,
}

impl ControlPlaneState {
    async fn record(&self, report: Report) {
        self.reports.lock().await.push(report);
        self.report_notify.notify_waiters();
    }
}

/// A running mock control plane bound to a random local port
pub struct MockControlPlane {
    addr: SocketAddr,
    state: Arc<ControlPlaneState>,
    invocation_tx: SyncMutex<Option<mpsc::UnboundedSender<PendingInvocation>>>,
    handle: JoinHandle<()>,
}

impl MockControlPlane {
    pub async fn start() -> Result<Self, TestError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (invocation_tx, invocation_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ControlPlaneState {
            invocation_rx: Mutex::new(invocation_rx),
            current_invocation: Mutex::new(None),
            reports: Mutex::new(Vec::new()),
            report_notify: Notify::new(),
            fail_reports: AtomicBool::new(false),
        });

        let router = control_plane_router(state.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "Mock control plane stopped");
            }
        });

        debug!(addr = %addr, "Mock control plane listening");

        Ok(Self {
            addr,
            state,
            invocation_tx: SyncMutex::new(Some(invocation_tx)),
            handle,
        })
    }

    /// Endpoint as `host:port`, the form `AWS_LAMBDA_RUNTIME_API` takes
    pub fn runtime_api(&self) -> String {
        self.addr.to_string()
    }

    /// Get the base URL
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue an invocation. Returns false once the queue is closed.
    pub fn enqueue(&self, invocation: PendingInvocation) -> bool {
        match self.invocation_tx.lock().as_ref() {
            Some(tx) => tx.send(invocation).is_ok(),
            None => false,
        }
    }

    /// Stop handing out invocations: once the queue drains, `next` answers 500
    pub fn close(&self) {
        self.invocation_tx.lock().take();
    }

    /// Make the response/error routes answer 500 without recording anything
    pub fn fail_reports(&self, fail: bool) {
        self.state.fail_reports.store(fail, Ordering::SeqCst);
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.state.reports.lock().await.clone()
    }

    /// Wait until at least `count` reports have been recorded
    pub async fn wait_for_reports(&self, count: usize, timeout: Duration) -> Result<Vec<Report>, TestError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.state.report_notify.notified();

            let received = {
                let reports = self.state.reports.lock().await;
                if reports.len() >= count {
                    return Ok(reports.clone());
                }
                reports.len()
            };

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TestError::Timeout {
                    expected: count,
                    received,
                });
            }
        }
    }
}

impl Drop for MockControlPlane {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn control_plane_router(state: Arc<ControlPlaneState>) -> Router {
    Router::new()
        .route(NEXT_INVOCATION_PATH, get(get_next_invocation))
        .route(
            "/2018-06-01/runtime/invocation/:request_id/response",
            post(post_invocation_response),
        )
        .route(
            "/2018-06-01/runtime/invocation/:request_id/error",
            post(post_invocation_error),
        )
        .route(INIT_ERROR_PATH, post(post_init_error))
        .with_state(state)
}

/// GET /runtime/invocation/next
///
/// Blocks until an invocation is available, then returns it.
async fn get_next_invocation(State(state): State<Arc<ControlPlaneState>>) -> Response {
    debug!("Runtime requesting next invocation");

    let invocation = {
        let mut rx = state.invocation_rx.lock().await;
        match rx.recv().await {
            Some(inv) => inv,
            None => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "Invocation channel closed").into_response();
            }
        }
    };

    *state.current_invocation.lock().await = Some(invocation.request_id.clone());

    debug!(request_id = %invocation.request_id, "Delivering invocation to runtime");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_REQUEST_ID, &invocation.request_id)
        .header(HEADER_FUNCTION_ARN, &invocation.function_arn)
        .header(HEADER_DEADLINE_MS, invocation.deadline_ms.to_string());

    if let Some(trace_id) = &invocation.trace_id {
        builder = builder.header(HEADER_TRACE_ID, trace_id);
    }

    builder
        .body(Body::from(invocation.payload))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Takes the active invocation if it matches `request_id`
async fn finish_invocation(state: &ControlPlaneState, request_id: &str) -> bool {
    let mut current = state.current_invocation.lock().await;

    match current.as_deref() {
        Some(active) if active == request_id => {
            current.take();
            true
        }
        Some(active) => {
            error!(expected = %active, received = %request_id, "Request ID mismatch");
            false
        }
        None => {
            error!(request_id = %request_id, "No active invocation");
            false
        }
    }
}

/// POST /runtime/invocation/{requestId}/response
async fn post_invocation_response(
    State(state): State<Arc<ControlPlaneState>>,
    Path(request_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    debug!(request_id = %request_id, "Runtime sending response");

    if state.fail_reports.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    if !finish_invocation(&state, &request_id).await {
        return StatusCode::BAD_REQUEST;
    }

    state.record(Report::Response { request_id, body }).await;
    StatusCode::ACCEPTED
}

/// POST /runtime/invocation/{requestId}/error
async fn post_invocation_error(
    State(state): State<Arc<ControlPlaneState>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let error_type = error_type(&headers);

    debug!(request_id = %request_id, error_type = ?error_type, "Runtime sending error");

    if state.fail_reports.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    if !finish_invocation(&state, &request_id).await {
        return StatusCode::BAD_REQUEST;
    }

    state
        .record(Report::Error {
            request_id,
            error_type,
            body,
        })
        .await;
    StatusCode::ACCEPTED
}

/// POST /runtime/init/error
async fn post_init_error(
    State(state): State<Arc<ControlPlaneState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let error_type = error_type(&headers);

    error!(
        error_type = ?error_type,
        body = %String::from_utf8_lossy(&body),
        "Runtime initialization error"
    );

    state.record(Report::InitError { error_type, body }).await;
    StatusCode::ACCEPTED
}

fn error_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HEADER_ERROR_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
