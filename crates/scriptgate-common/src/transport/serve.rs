use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{Request, Response};
use crate::protocol::error::Result;
use crate::transport::codec::JsonCodec;
use crate::transport::framing::{read_frame, write_frame};

/// Serves calls on one connection until the peer goes away.
///
/// Calls are strictly sequential: a request is handled and answered before
/// the next frame is read. A frame that does not decode is answered with an
/// error response (id 0) and the stream continues; framing or I/O errors end
/// the stream and are returned.
///
/// # Arguments
/// * `stream` - Any established byte stream (typically a server-side TLS stream)
/// * `handler` - Produces the response for each decoded request
pub async fn serve_connection<S, F, Fut>(mut stream: S, handler: F) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Response>,
{
    loop {
        let Some(buf) = read_frame(&mut stream).await? else {
            tracing::debug!("Connection closed by peer");
            return Ok(());
        };

        let request = match JsonCodec::decode_request(&buf) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Failed to decode request: {}", e);
                send_response(&mut stream, &Response::error(0, e.to_string())).await?;
                continue;
            }
        };

        let response = handler(request).await;
        send_response(&mut stream, &response).await?;
    }
}

async fn send_response<S>(stream: &mut S, response: &Response) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let encoded = JsonCodec::encode_response(response)?;
    write_frame(stream, &encoded).await
}
