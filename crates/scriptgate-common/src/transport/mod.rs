//! Transport layer
//!
//! - **[`framing`]**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **[`JsonCodec`]**: encodes/decodes the call envelopes
//! - **[`serve_connection`]**: the server-side per-connection call loop
//! - **[`tls`]**: PEM parsing and rustls client configuration
//! - **[`ScriptgateClient`]**: mutual-TLS client used by the CLI and tests
//!
//! All frames are capped at 100 MB.

pub mod client;
pub mod codec;
pub mod framing;
pub mod serve;
pub mod tls;

pub use client::ScriptgateClient;
pub use codec::JsonCodec;
pub use framing::{read_frame, write_frame, MAX_MESSAGE_SIZE};
pub use serve::serve_connection;
pub use tls::ClientIdentity;
