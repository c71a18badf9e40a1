//! Response envelope.

use serde::{Deserialize, Serialize};
use super::RequestId;

/// Handler result (JSON value).
pub type RpcResult = serde_json::Value;

/// The reply to a [`Request`](super::Request).
///
/// Exactly one of `result` and `error` is set; `success` says which.
///
/// # Example
///
/// ```
/// use scriptgate_common::protocol::responses::Response;
/// use serde_json::json;
///
/// let ok = Response::success(7, json!({"Data": "done\n"}));
/// assert!(ok.success);
///
/// let failed = Response::error(7, "Failed to execute deploy.ps1: exit status: 1");
/// assert_eq!(failed.result, None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Id of the request this answers
    pub id: RequestId,
    pub result: Option<RpcResult>,
    pub error: Option<String>,
    pub success: bool,
}

impl Response {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            success: true,
        }
    }

    /// Creates an error response.
    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            success: false,
        }
    }
}
