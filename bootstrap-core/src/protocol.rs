//! Lambda Runtime API routes and header names

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// API version prefix shared by every route
pub const API_VERSION: &str = "2018-06-01";

pub const NEXT_INVOCATION_PATH: &str = "/2018-06-01/runtime/invocation/next";
pub const INIT_ERROR_PATH: &str = "/2018-06-01/runtime/init/error";

pub const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
pub const HEADER_DEADLINE_MS: &str = "Lambda-Runtime-Deadline-Ms";
pub const HEADER_FUNCTION_ARN: &str = "Lambda-Runtime-Invoked-Function-Arn";
pub const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
pub const HEADER_CLIENT_CONTEXT: &str = "Lambda-Runtime-Client-Context";
pub const HEADER_COGNITO_IDENTITY: &str = "Lambda-Runtime-Cognito-Identity";
pub const HEADER_ERROR_TYPE: &str = "Lambda-Runtime-Function-Error-Type";

/// Environment variable used by tracing SDKs to pick up the current trace id
pub const TRACE_ID_ENV: &str = "_X_AMZN_TRACE_ID";

/// Characters left as-is when a request id is placed in a path segment
const REQUEST_ID_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

/// Path for posting a successful invocation response
pub fn invocation_response_path(request_id: &str) -> String {
    invocation_path(request_id, "response")
}

/// Path for posting an invocation error
pub fn invocation_error_path(request_id: &str) -> String {
    invocation_path(request_id, "error")
}

fn invocation_path(request_id: &str, action: &str) -> String {
    let request_id = utf8_percent_encode(request_id, REQUEST_ID_SEGMENT);
    format!("/{API_VERSION}/runtime/invocation/{request_id}/{action}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_paths() {
        assert_eq!(
            invocation_response_path("abc"),
            "/2018-06-01/runtime/invocation/abc/response"
        );
        assert_eq!(
            invocation_error_path("abc"),
            "/2018-06-01/runtime/invocation/abc/error"
        );
    }

    #[test]
    fn test_request_id_stays_one_path_segment() {
        assert_eq!(
            invocation_response_path("8476a536-e9f4-11e8-9739-2dfe598c3fcd"),
            "/2018-06-01/runtime/invocation/8476a536-e9f4-11e8-9739-2dfe598c3fcd/response"
        );
        assert_eq!(
            invocation_error_path("a/b?c"),
            "/2018-06-01/runtime/invocation/a%2Fb%3Fc/error"
        );
    }
}
