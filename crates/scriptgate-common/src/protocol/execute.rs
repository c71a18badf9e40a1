//! Payloads of the `Execute` operation.
//!
//! These ride inside the generic [`Request`](super::Request) /
//! [`Response`](super::Response) envelope as `args` and `result`.

use serde::{Deserialize, Serialize};

/// Method name the script invoker is registered under.
pub const EXECUTE_METHOD: &str = "Execute";

/// Run `file` (relative to the agent's script root) with `params`.
///
/// Parameters are an ordered list so the interpreter's argument order is
/// exactly the caller's order. On the wire they are `[key, value]` pairs:
///
/// ```json
/// { "File": "deploy.ps1", "Params": [["Target", "prod"], ["Force", "1"]] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteRequest {
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Params", default)]
    pub params: Vec<(String, String)>,
}

impl ExecuteRequest {
    pub fn new(file: impl Into<String>) -> Self {
        ExecuteRequest {
            file: file.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter after the ones already present.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Returns the first key that appears more than once, if any.
    pub fn duplicate_key(&self) -> Option<&str> {
        self.params.iter().enumerate().find_map(|(i, (key, _))| {
            self.params[..i]
                .iter()
                .any(|(earlier, _)| earlier == key)
                .then_some(key.as_str())
        })
    }
}

/// Captured standard output of the script, verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteResponse {
    #[serde(rename = "Data")]
    pub data: String,
}
