//! Test utilities for the Lambda bootstrap
//!
//! Provides an in-process mock of the Lambda Runtime API:
//! - Queue invocations for the runtime to fetch
//! - Record the responses and errors it posts back
//! - Simulate endpoint failures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bootstrap_test::{MockControlPlane, PendingInvocation};
//! use std::time::Duration;
//!
//! #[tokio::test]
//! async fn test_runtime() {
//!     let control_plane = MockControlPlane::start().await.unwrap();
//!     control_plane.enqueue(PendingInvocation::new("abc", r#"{"x":1}"#));
//!
//!     // Point the runtime at control_plane.runtime_api() ...
//!
//!     let reports = control_plane.wait_for_reports(1, Duration::from_secs(5)).await.unwrap();
//! }
//! ```

pub mod control_plane;

pub use control_plane::{MockControlPlane, PendingInvocation, Report, TestError};

/// Default wait used by tests for reports to arrive
pub const REPORT_TIMEOUT_SECS: u64 = 5;
