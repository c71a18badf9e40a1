use rustls::pki_types::ServerName;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::protocol::{ExecuteRequest, ExecuteResponse, Request, EXECUTE_METHOD};
use crate::protocol::error::{Result, ScriptgateError};
use crate::transport::codec::JsonCodec;
use crate::transport::framing::{read_frame, write_frame};
use crate::transport::tls::ClientIdentity;

/// A mutual-TLS connection to a scriptgate agent.
///
/// The connection is kept open across calls; calls on one connection are
/// answered in order.
///
/// # Example
///
/// ```no_run
/// use scriptgate_common::protocol::ExecuteRequest;
/// use scriptgate_common::transport::{ClientIdentity, ScriptgateClient};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> scriptgate_common::Result<()> {
/// let identity = ClientIdentity::from_files(
///     Path::new("ca.pem"),
///     Path::new("client.pem"),
///     Path::new("client.key"),
/// )?;
/// let mut client = ScriptgateClient::connect("10.0.0.5:7443", "agent.local", &identity).await?;
/// let output = client
///     .execute(ExecuteRequest::new("deploy.ps1").param("Target", "prod"))
///     .await?;
/// print!("{}", output.data);
/// # Ok(())
/// # }
/// ```
pub struct ScriptgateClient {
    stream: TlsStream<TcpStream>,
}

impl ScriptgateClient {
    /// Connects and completes the TLS handshake.
    ///
    /// # Arguments
    /// * `addr` - The agent's `<address>:<port>`
    /// * `server_name` - Name the agent's certificate is issued for
    /// * `identity` - Trusted CA plus the client certificate to present
    pub async fn connect(addr: &str, server_name: &str, identity: &ClientIdentity) -> Result<Self> {
        let tcp = TcpStream::connect(addr).await.map_err(|e| {
            ScriptgateError::Connection(format!("Failed to connect to {}: {}", addr, e))
        })?;

        let server_name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| ScriptgateError::Handshake(format!("invalid server name: {e}")))?;

        let stream = identity
            .connector()
            .connect(server_name, tcp)
            .await
            .map_err(|e| ScriptgateError::Handshake(format!("TLS handshake failed: {e}")))?;

        Ok(Self { stream })
    }

    /// Calls `method` and returns its result value.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Remote`] carrying the agent's message when
    /// the call fails on the agent side.
    pub async fn call(&mut self, method: impl Into<String>, args: Value) -> Result<Value> {
        let request = Request::new(method, args);
        write_frame(&mut self.stream, &JsonCodec::encode_request(&request)?).await?;

        let body = read_frame(&mut self.stream).await?.ok_or_else(|| {
            ScriptgateError::Connection("connection closed before response".to_string())
        })?;
        let response = JsonCodec::decode_response(&body)?;

        if response.id != request.id {
            return Err(ScriptgateError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        if response.success {
            response.result.ok_or_else(|| {
                ScriptgateError::InvalidResponse("Missing result in success response".to_string())
            })
        } else {
            Err(ScriptgateError::Remote(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }

    /// Runs a script on the agent.
    pub async fn execute(&mut self, request: ExecuteRequest) -> Result<ExecuteResponse> {
        let result = self.call(EXECUTE_METHOD, serde_json::to_value(&request)?).await?;
        Ok(serde_json::from_value(result)?)
    }
}
