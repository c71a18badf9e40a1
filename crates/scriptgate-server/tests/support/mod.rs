//! Shared fixtures for agent integration tests: a throwaway PKI, a script
//! directory and a config pointing at both.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use scriptgate_common::protocol::error::Result;
use scriptgate_common::protocol::{RpcArgs, RpcResult};
use scriptgate_common::transport::{ClientIdentity, ScriptgateClient};
use scriptgate_server::{Config, HandlerRegistry, Manager};

/// Stand-in interpreter for `/bin/sh`: prints each argument on its own line,
/// then sources the script that follows `-File`.
pub const STAND_IN: &str = r#"
script=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-File" ]; then script="$arg"; fi
  prev="$arg"
done
for arg in "$@"; do
  printf '%s\n' "$arg"
done
. "$script"
"#;

pub struct Authority {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Authority {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issues a leaf for `name`, returning `(cert_pem, key_pem)`.
    pub fn issue(&self, name: &str, usage: ExtendedKeyUsagePurpose) -> (String, String) {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![usage];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    pub fn client_identity(&self, name: &str) -> ClientIdentity {
        let (cert, key) = self.issue(name, ExtendedKeyUsagePurpose::ClientAuth);
        ClientIdentity::from_pem(self.pem().as_bytes(), cert.as_bytes(), key.as_bytes()).unwrap()
    }
}

/// Everything an agent needs on disk, rooted in one temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub ca: Authority,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ca = Authority::new("scriptgate integration CA");
        let (leaf, leaf_key) = ca.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth);

        let cert_path = dir.path().join("agent.crt");
        let key_path = dir.path().join("agent.key");
        std::fs::write(&cert_path, format!("{}{}", leaf, ca.pem())).unwrap();
        std::fs::write(&key_path, leaf_key).unwrap();

        let stand_in = dir.path().join("interpreter.sh");
        std::fs::write(&stand_in, STAND_IN).unwrap();

        let scripts = dir.path().join("scripts");
        std::fs::create_dir(&scripts).unwrap();

        let config = Config {
            interpreter_path: "/bin/sh".into(),
            interpreter_options: stand_in.display().to_string(),
            scripts_path: scripts,
            max_connections: 4,
            bind_addr: "127.0.0.1".into(),
            bind_port: "0".into(),
            key_path,
            cert_path,
        };

        Self { dir, ca, config }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn scripts(&self) -> &Path {
        &self.config.scripts_path
    }

    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.scripts().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    /// Overwrites the agent's certificate file.
    pub fn write_chain(&self, pem: &str) {
        std::fs::write(&self.config.cert_path, pem).unwrap();
    }

    pub fn identity(&self) -> ClientIdentity {
        self.ca.client_identity("integration-client")
    }
}

/// An agent serving on an ephemeral port.
pub struct RunningAgent {
    pub manager: Arc<Manager>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
}

impl RunningAgent {
    pub async fn start(config: &Config) -> Self {
        Self::start_with(config, ping_registry()).await
    }

    pub async fn start_with(config: &Config, registry: HandlerRegistry) -> Self {
        Self::start_manager(Manager::with_registry(config, registry).unwrap()).await
    }

    pub async fn start_manager(manager: Manager) -> Self {
        let manager = Arc::new(manager);
        let listener: TcpListener = manager.listen().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.serve(listener).await })
        };

        Self { manager, addr, handle }
    }

    pub async fn connect(&self, identity: &ClientIdentity) -> Result<ScriptgateClient> {
        ScriptgateClient::connect(&self.addr.to_string(), "localhost", identity).await
    }
}

/// `Ping` answers `"pong"`; agents built with it can be probed without
/// running an interpreter.
pub fn ping_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("Ping", |_args: RpcArgs| -> Result<RpcResult> {
        Ok(serde_json::json!("pong"))
    });
    registry
}
