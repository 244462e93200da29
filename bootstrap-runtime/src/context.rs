//! Per-invocation context passed to handlers

use bootstrap_core::protocol::{
    HEADER_CLIENT_CONTEXT, HEADER_COGNITO_IDENTITY, HEADER_DEADLINE_MS, HEADER_FUNCTION_ARN,
    HEADER_REQUEST_ID,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::config::FunctionSettings;
use crate::invocation::Invocation;
use crate::runtime::RuntimeError;

/// Lambda context passed to the handler
///
/// Static function metadata merged with the headers of one invocation.
/// Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Context {
    pub aws_request_id: String,
    /// Deadline in milliseconds since the Unix epoch, 0 when unknown
    pub deadline_ms: i64,
    pub invoked_function_arn: String,
    pub trace_id: Option<String>,
    pub client_context: Option<String>,
    pub cognito_identity: Option<String>,
    pub memory_limit_in_mb: u32,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub function_name: String,
    pub function_version: String,
}

impl Context {
    pub fn new(function: &FunctionSettings, invocation: &Invocation) -> Result<Self, RuntimeError> {
        let aws_request_id = invocation
            .request_id()
            .ok_or(RuntimeError::MissingHeader(HEADER_REQUEST_ID))?
            .to_string();

        let deadline_ms = invocation
            .header(HEADER_DEADLINE_MS)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        Ok(Self {
            aws_request_id,
            deadline_ms,
            invoked_function_arn: invocation
                .header(HEADER_FUNCTION_ARN)
                .unwrap_or_default()
                .to_string(),
            trace_id: invocation.trace_id().map(str::to_string),
            client_context: invocation.header(HEADER_CLIENT_CONTEXT).map(str::to_string),
            cognito_identity: invocation.header(HEADER_COGNITO_IDENTITY).map(str::to_string),
            memory_limit_in_mb: function.memory_limit_in_mb,
            log_group_name: function.log_group_name.clone(),
            log_stream_name: function.log_stream_name.clone(),
            function_name: function.function_name.clone(),
            function_version: function.function_version.clone(),
        })
    }

    /// Deadline as a timestamp, if the control plane supplied one
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if self.deadline_ms <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.deadline_ms).single()
    }

    /// Get remaining time in milliseconds
    pub fn get_remaining_time_in_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.deadline_ms.saturating_sub(now).max(0)
    }
}
