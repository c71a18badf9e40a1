//! Agent configuration document.
//!
//! The document is YAML:
//!
//! ```yaml
//! ---
//! ps_path: "%SYSTEMROOT%\\System32\\WindowsPowerShell\\v1.0\\powershell.exe"
//! ps_opts: -NoProfile -NonInteractive -ExecutionPolicy Bypass
//! scripts_path: scripts
//! max_connections: 10
//! bind_addr: 0.0.0.0
//! bind_port: "7443"
//! crt_path: C:\ssl\agent.crt
//! key_path: C:\ssl\agent.key
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use scriptgate_common::protocol::error::{Result, ScriptgateError};

/// Default admission limit when `max_connections` is omitted.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// Accepts `bind_port: 7443` as well as `bind_port: "7443"`.
fn port_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    })
}

/// Immutable startup configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Interpreter executable; `%NAME%` tokens are expanded from the environment
    #[serde(rename = "ps_path")]
    pub interpreter_path: String,
    /// Space-separated flags placed before `-File`
    #[serde(rename = "ps_opts")]
    pub interpreter_options: String,
    /// Script root; relative paths resolve against the executable's directory
    #[serde(rename = "scripts_path")]
    pub scripts_path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    pub bind_addr: String,
    #[serde(deserialize_with = "port_string")]
    pub bind_port: String,
    pub key_path: PathBuf,
    #[serde(rename = "crt_path")]
    pub cert_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpreter_path: String::new(),
            interpreter_options: String::new(),
            scripts_path: PathBuf::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            bind_addr: String::new(),
            bind_port: String::new(),
            key_path: PathBuf::new(),
            cert_path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Reads and parses the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Configuration`] if the file does not exist,
    /// cannot be read, or is not a valid document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScriptgateError::Configuration(format!(
                "File does not exist {}",
                path.display()
            )));
        }

        let data = std::fs::read_to_string(path).map_err(|e| {
            ScriptgateError::Configuration(format!("Unable to read file {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&data)
    }

    /// Parses a YAML document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        // An empty or bare `---` document means "all defaults"
        if data.trim().is_empty() || data.trim() == "---" {
            return Ok(Self::default());
        }

        serde_yaml::from_str(data).map_err(|e| {
            ScriptgateError::Configuration(format!("Unable to unmarshal configuration: {}", e))
        })
    }

    /// Checks the fields every agent needs before it can listen.
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.is_empty() || self.bind_port.is_empty() {
            return Err(ScriptgateError::Configuration(
                "bind_addr and bind_port must be specified in the configuration".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ScriptgateError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `<bind_addr>:<bind_port>`
    pub fn bind_endpoint(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }
}
