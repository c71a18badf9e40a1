use crate::protocol::{Request, Response};
use crate::protocol::error::Result;

/// JSON codec for call envelopes.
///
/// Frame bodies are plain `serde_json` documents; framing lives in
/// [`framing`](super::framing).
///
/// # Example
///
/// ```
/// use scriptgate_common::transport::JsonCodec;
/// use scriptgate_common::protocol::{ExecuteRequest, Request, EXECUTE_METHOD};
///
/// let args = serde_json::to_value(ExecuteRequest::new("deploy.ps1")).unwrap();
/// let request = Request::new(EXECUTE_METHOD, args);
///
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}
