//! Method-name dispatch for incoming calls.

use std::collections::HashMap;
use std::sync::Arc;

use scriptgate_common::protocol::{Request, Response, RpcArgs, RpcResult};
use scriptgate_common::protocol::error::{Result, ScriptgateError};

/// A synchronous call handler.
///
/// Handlers run on tokio's blocking pool, so they may block on process I/O.
pub trait CallHandler: Send + Sync + 'static {
    fn call(&self, args: RpcArgs) -> Result<RpcResult>;
}

impl<F> CallHandler for F
where
    F: Fn(RpcArgs) -> Result<RpcResult> + Send + Sync + 'static,
{
    fn call(&self, args: RpcArgs) -> Result<RpcResult> {
        self(args)
    }
}

/// Handlers keyed by method name.
///
/// Each [`Manager`](crate::Manager) owns its own registry, so several agents
/// can live in one process without sharing handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CallHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `method`, returning any handler it replaced.
    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl CallHandler,
    ) -> Option<Arc<dyn CallHandler>> {
        self.handlers.insert(method.into(), Arc::new(handler))
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Runs the handler for `request.method` and wraps the outcome.
    ///
    /// Handler failures become error responses; they never end the
    /// connection.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Request { id, method, args } = request;

        let Some(handler) = self.handlers.get(&method).cloned() else {
            tracing::warn!("Call for unknown method: {}", method);
            return Response::error(id, ScriptgateError::MethodNotFound(method).to_string());
        };

        tracing::debug!("Dispatching request {} to {}", id, method);
        match tokio::task::spawn_blocking(move || handler.call(args)).await {
            Ok(Ok(result)) => Response::success(id, result),
            Ok(Err(e)) => {
                tracing::warn!("{} failed: {}", method, e);
                Response::error(id, e.to_string())
            }
            Err(e) => {
                tracing::error!("{} handler did not complete: {}", method, e);
                Response::error(id, format!("handler for {} did not complete: {}", method, e))
            }
        }
    }
}
