//! The agent: listener, admission and per-connection workers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use scriptgate_common::protocol::error::{Result, ScriptgateError};
use scriptgate_common::protocol::EXECUTE_METHOD;
use scriptgate_common::transport::serve_connection;

use crate::admission::{ConnectionQueue, Slot};
use crate::config::Config;
use crate::interpolate::interpolate;
use crate::invoker::ScriptInvoker;
use crate::registry::HandlerRegistry;
use crate::tls::TlsSettings;

/// Longest a peer may take to complete the TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A configured agent.
///
/// Built once from a [`Config`]; everything it holds is read-only afterwards.
/// At most `max_connections` connections are queued or in service at any
/// moment. Further peers wait in the listen backlog until a slot frees up.
///
/// # Example
///
/// ```no_run
/// use scriptgate_server::{Config, Manager};
///
/// # async fn run() -> scriptgate_common::Result<()> {
/// let config = Config::load("config.yaml")?;
/// let manager = Manager::new(&config)?;
/// manager.run().await
/// # }
/// ```
pub struct Manager {
    tls: TlsSettings,
    bind_endpoint: String,
    registry: Arc<HandlerRegistry>,
    queue: Arc<ConnectionQueue<TcpStream>>,
    handshake_timeout: Duration,
}

impl Manager {
    /// Builds an agent serving `Execute` from `config`.
    ///
    /// # Errors
    ///
    /// * [`ScriptgateError::Configuration`] if the bind address is incomplete
    ///   or the script root cannot be resolved
    /// * [`ScriptgateError::Certificate`] if the certificate file does not hold
    ///   exactly a leaf and its CA, or the key cannot be loaded
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_registry(config, HandlerRegistry::new())
    }

    /// Like [`Manager::new`], with extra handlers already in `registry`.
    pub fn with_registry(config: &Config, mut registry: HandlerRegistry) -> Result<Self> {
        config.validate()?;

        let invoker = ScriptInvoker::new(
            resolve_script_root(config)?,
            interpolate(&config.interpreter_path),
            config.interpreter_options.clone(),
        );
        tracing::info!(
            "Scripts from {} run with {}",
            invoker.script_root().display(),
            invoker.interpreter().display()
        );
        registry.register(EXECUTE_METHOD, invoker);

        let tls = TlsSettings::load(&config.cert_path, &config.key_path)?;

        Ok(Self {
            tls,
            bind_endpoint: config.bind_endpoint(),
            registry: Arc::new(registry),
            queue: Arc::new(ConnectionQueue::new(config.max_connections)),
            handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
        })
    }

    /// Replaces the [`TLS_HANDSHAKE_TIMEOUT`] applied to each admitted peer.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// `<bind_addr>:<bind_port>` as configured.
    pub fn bind_endpoint(&self) -> &str {
        &self.bind_endpoint
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Connection slots free for new connections. Once serving, the accept
    /// loop holds one slot while it waits for the next peer.
    pub fn available_slots(&self) -> usize {
        self.queue.available_slots()
    }

    /// Binds the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Listen`] if the endpoint cannot be bound.
    pub async fn listen(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.bind_endpoint)
            .await
            .map_err(|source| ScriptgateError::Listen {
                endpoint: self.bind_endpoint.clone(),
                source,
            })
    }

    /// Binds the endpoint and serves until [`close`](Self::close).
    pub async fn run(&self) -> Result<()> {
        let listener = self.listen().await?;
        self.serve(listener).await
    }

    /// Serves connections from `listener` until [`close`](Self::close).
    ///
    /// Returns once admission has stopped and the listener is dropped.
    /// Connections already in service are left to finish on their own.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {}", addr);
        }

        let accept_task = tokio::spawn(accept_loop(listener, self.queue.clone()));

        while let Some(admitted) = self.queue.pop().await {
            let (stream, peer, slot) = admitted.into_parts();
            let acceptor = self.tls.acceptor();
            let registry = self.registry.clone();
            let handshake_timeout = self.handshake_timeout;

            tokio::spawn(async move {
                serve_admitted(acceptor, registry, stream, peer, handshake_timeout, slot).await;
            });
        }

        accept_task.abort();
        let _ = accept_task.await;
        tracing::info!("Stopped listening on {}", self.bind_endpoint);
        Ok(())
    }

    /// Stops admission. Queued connections are dropped unserved and
    /// [`run`](Self::run) / [`serve`](Self::serve) return.
    pub fn close(&self) {
        if !self.queue.is_closed() {
            tracing::info!("Closing agent on {}", self.bind_endpoint);
        }
        self.queue.close();
    }
}

fn resolve_script_root(config: &Config) -> Result<PathBuf> {
    if config.scripts_path.is_absolute() {
        return Ok(config.scripts_path.clone());
    }

    let exe = std::env::current_exe().map_err(|e| {
        ScriptgateError::Configuration(format!("unable to locate the agent executable: {}", e))
    })?;
    let base = exe.parent().ok_or_else(|| {
        ScriptgateError::Configuration(format!(
            "agent executable {} has no parent directory",
            exe.display()
        ))
    })?;
    Ok(base.join(&config.scripts_path))
}

async fn accept_loop(listener: TcpListener, queue: Arc<ConnectionQueue<TcpStream>>) {
    while let Some(slot) = queue.reserve().await {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Connection established from {}", peer);
                if queue.push(stream, peer, slot).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("{}", ScriptgateError::Accept(e));
                drop(slot);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
    tracing::debug!("Accept loop stopped");
}

async fn serve_admitted(
    acceptor: TlsAcceptor,
    registry: Arc<HandlerRegistry>,
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
    _slot: Slot,
) {
    let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            tracing::warn!("{}", ScriptgateError::Handshake(format!("{}: {}", peer, e)));
            return;
        }
        Err(_) => {
            tracing::warn!(
                "{}",
                ScriptgateError::Handshake(format!("{}: timed out", peer))
            );
            return;
        }
    };

    let registry = &*registry;
    match serve_connection(tls, move |request| registry.dispatch(request)).await {
        Ok(()) => tracing::debug!("Connection from {} closed", peer),
        Err(e) => tracing::warn!("Connection from {} ended: {}", peer, e),
    }
}
