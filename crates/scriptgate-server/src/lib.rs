//! scriptgate agent
//!
//! Accepts mutually authenticated TLS connections and runs scripts from a
//! fixed directory through a configured interpreter on behalf of the caller.
//!
//! - [`Config`] is the YAML startup document
//! - [`Manager`] owns the listener, the admission limit and the workers
//! - [`ScriptInvoker`] builds and runs the interpreter command line
//! - [`HandlerRegistry`] maps method names to handlers
//!
//! ```
//! use scriptgate_server::interpolate::interpolate_with;
//!
//! let path = interpolate_with("%SYSTEMROOT%\\System32", |name| {
//!     (name == "SYSTEMROOT").then(|| "C:\\Windows".to_string())
//! });
//! assert_eq!(path, "C:\\Windows\\System32");
//! ```

pub mod admission;
pub mod config;
pub mod interpolate;
pub mod invoker;
pub mod manager;
pub mod registry;
pub mod tls;

pub use config::Config;
pub use invoker::ScriptInvoker;
pub use manager::Manager;
pub use registry::{CallHandler, HandlerRegistry};
pub use tls::TlsSettings;
