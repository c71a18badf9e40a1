//! scriptgate common types and transport
//!
//! Shared protocol definitions and the mutual-TLS transport used by the
//! scriptgate agent and its clients.
//!
//! # Architecture
//!
//! - **Protocol**: a generic `Request`/`Response` envelope carrying JSON; the
//!   agent's only operation, `Execute`, is defined in [`protocol::execute`]
//! - **Transport**: TLS over TCP, one call at a time per connection
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use scriptgate_common::{ExecuteRequest, Request, Response, EXECUTE_METHOD};
//! use serde_json::json;
//!
//! let payload = ExecuteRequest::new("deploy.ps1").param("Target", "prod");
//! let request = Request::new(EXECUTE_METHOD, serde_json::to_value(&payload).unwrap());
//!
//! let response = Response::success(request.id, json!({"Data": "deployed\n"}));
//! assert!(response.success);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
