//! Core types for the Lambda bootstrap
//!
//! This crate holds the pieces of the Runtime API contract that both the
//! runtime loop and the mock control plane need to agree on.

pub mod error;
pub mod protocol;

pub use error::{ErrorDescriptor, ErrorType};
