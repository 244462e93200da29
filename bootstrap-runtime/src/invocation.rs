//! Invocations fetched from the Runtime API

use bootstrap_core::protocol::{HEADER_REQUEST_ID, HEADER_TRACE_ID};
use bytes::Bytes;
use std::collections::HashMap;

/// One unit of work: the raw payload plus the response headers it came with.
///
/// Header names are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub body: Bytes,
    headers: HashMap<String, String>,
}

impl Invocation {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn from_parts<I, K, V>(body: impl Into<Bytes>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();

        Self {
            body: body.into(),
            headers,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(HEADER_REQUEST_ID)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.header(HEADER_TRACE_ID)
    }
}
