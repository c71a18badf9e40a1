//! Turns an `Execute` call into an interpreter process.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use scriptgate_common::protocol::{ExecuteRequest, ExecuteResponse, RpcArgs, RpcResult};
use scriptgate_common::protocol::error::{Result, ScriptgateError};

use crate::registry::CallHandler;

/// Flag that introduces the script path on the interpreter command line.
pub const FILE_FLAG: &str = "-File";

/// Runs scripts from a fixed root with a fixed interpreter.
///
/// All fields are set at construction and only read afterwards, so one
/// invoker is shared by every connection.
///
/// The command line for a call is:
///
/// ```text
/// <interpreter> <default options...> -File <root>/<file> [-<key> <value>]...
/// ```
#[derive(Debug, Clone)]
pub struct ScriptInvoker {
    script_root: PathBuf,
    interpreter: PathBuf,
    default_options: String,
}

impl ScriptInvoker {
    /// # Arguments
    /// * `script_root` - Absolute directory scripts are resolved against
    /// * `interpreter` - Interpreter executable, already environment-expanded
    /// * `default_options` - Space-separated flags placed first on every command line
    pub fn new(
        script_root: impl Into<PathBuf>,
        interpreter: impl Into<PathBuf>,
        default_options: impl Into<String>,
    ) -> Self {
        Self {
            script_root: script_root.into(),
            interpreter: interpreter.into(),
            default_options: default_options.into(),
        }
    }

    pub fn script_root(&self) -> &Path {
        &self.script_root
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Joins `file` onto the script root.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Execution`] if `file` is empty, absolute,
    /// or walks upwards with `..`.
    pub fn resolve_script(&self, file: &str) -> Result<PathBuf> {
        let relative = Path::new(file);
        let mut has_name = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => has_name = true,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ScriptgateError::execution(file, "path escapes the script root"));
                }
            }
        }
        if !has_name {
            return Err(ScriptgateError::execution(file, "no script file named"));
        }

        Ok(self.script_root.join(relative))
    }

    /// Builds the interpreter arguments for `script` and `params`.
    pub fn build_args(&self, script: &Path, params: &[(String, String)]) -> Vec<OsString> {
        let mut args: Vec<OsString> = self
            .default_options
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(OsString::from)
            .collect();

        args.push(FILE_FLAG.into());
        args.push(script.into());

        for (key, value) in params {
            args.push(format!("-{}", key).into());
            args.push(value.into());
        }

        args
    }

    /// Runs the requested script and returns its standard output.
    ///
    /// Blocks until the interpreter exits. No timeout is applied.
    pub fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse> {
        let file = request.file.as_str();

        if let Some(key) = request.duplicate_key() {
            return Err(ScriptgateError::InvalidRequest(format!(
                "parameter {} given more than once",
                key
            )));
        }
        if request.params.iter().any(|(key, _)| key.is_empty()) {
            return Err(ScriptgateError::InvalidRequest("empty parameter name".to_string()));
        }

        let script = self.resolve_script(file)?;
        if !script.is_file() {
            return Err(ScriptgateError::execution(
                file,
                format!("script not found at {}", script.display()),
            ));
        }

        let args = self.build_args(&script, &request.params);
        tracing::info!("Executing {} with {} {:?}", file, self.interpreter.display(), args);

        let output = Command::new(&self.interpreter)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ScriptgateError::execution(file, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            tracing::warn!("{} exited with {}: {}", file, output.status, stderr);

            let reason = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(ScriptgateError::execution(file, reason));
        }

        let data = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!("{} returned {} bytes", file, data.len());

        Ok(ExecuteResponse { data })
    }
}

impl CallHandler for ScriptInvoker {
    fn call(&self, args: RpcArgs) -> Result<RpcResult> {
        let request: ExecuteRequest = serde_json::from_value(args).map_err(|e| {
            ScriptgateError::InvalidRequest(format!("malformed Execute request: {}", e))
        })?;
        let response = self.execute(&request)?;
        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoker(options: &str) -> ScriptInvoker {
        ScriptInvoker::new("/srv/scripts", "/usr/bin/pwsh", options)
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.into_string().unwrap()).collect()
    }

    #[test]
    fn test_build_args_layout() {
        let invoker = invoker("-NoProfile -ExecutionPolicy Bypass");
        let script = invoker.resolve_script("deploy.ps1").unwrap();
        let params = vec![
            ("Target".to_string(), "prod".to_string()),
            ("Region".to_string(), "eu west".to_string()),
        ];

        let args = strings(invoker.build_args(&script, &params));
        assert_eq!(
            args,
            vec![
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
                "/srv/scripts/deploy.ps1",
                "-Target",
                "prod",
                "-Region",
                "eu west",
            ]
        );
    }

    #[test]
    fn test_build_args_without_options_or_params() {
        let invoker = invoker("");
        let script = invoker.resolve_script("a.ps1").unwrap();

        let args = strings(invoker.build_args(&script, &[]));
        assert_eq!(args, vec!["-File", "/srv/scripts/a.ps1"]);
    }

    #[test]
    fn test_build_args_skips_empty_option_tokens() {
        let invoker = invoker("  -NoProfile  ");
        let script = invoker.resolve_script("a.ps1").unwrap();

        let args = strings(invoker.build_args(&script, &[]));
        assert_eq!(args, vec!["-NoProfile", "-File", "/srv/scripts/a.ps1"]);
    }

    #[test]
    fn test_resolve_script_in_subdirectory() {
        let path = invoker("").resolve_script("./ops/deploy.ps1").unwrap();
        assert_eq!(path, PathBuf::from("/srv/scripts/ops/deploy.ps1"));
    }

    #[test]
    fn test_resolve_script_rejects_escapes() {
        let invoker = invoker("");
        for file in ["../etc/passwd", "ops/../../x.ps1", "/etc/passwd", "", "."] {
            let result = invoker.resolve_script(file);
            assert!(
                matches!(result, Err(ScriptgateError::Execution { .. })),
                "{:?} should be rejected",
                file
            );
        }
    }

    #[test]
    fn test_missing_script_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = ScriptInvoker::new(dir.path(), "/bin/sh", "");

        let result = invoker.execute(&ExecuteRequest::new("missing.ps1"));
        match result {
            Err(ScriptgateError::Execution { file, .. }) => assert_eq!(file, "missing.ps1"),
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_params_are_rejected() {
        let invoker = invoker("");
        let request = ExecuteRequest::new("a.ps1").param("A", "1").param("A", "2");

        let result = invoker.execute(&request);
        assert!(matches!(result, Err(ScriptgateError::InvalidRequest(_))));
    }

    #[test]
    fn test_malformed_args_are_invalid_request() {
        let result = invoker("").call(json!({"Params": 5}));
        assert!(matches!(result, Err(ScriptgateError::InvalidRequest(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        /// Stand-in interpreter: echoes its arguments one per line, then
        /// sources the script named after `-File`.
        const STAND_IN: &str = r#"
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

        fn setup() -> (tempfile::TempDir, ScriptInvoker) {
            let dir = tempfile::tempdir().unwrap();
            let stand_in = dir.path().join("interpreter.sh");
            std::fs::write(&stand_in, STAND_IN).unwrap();
            let root = dir.path().join("scripts");
            std::fs::create_dir(&root).unwrap();

            // `sh <stand-in>` avoids exec'ing a file the test just wrote
            let invoker = ScriptInvoker::new(&root, "/bin/sh", stand_in.display().to_string());
            (dir, invoker)
        }

        #[test]
        fn test_execute_returns_stdout_verbatim() {
            let (_dir, invoker) = setup();
            let script = invoker.script_root().join("deploy.ps1");
            std::fs::write(&script, "printf 'done\\n\\n'\n").unwrap();

            let response = invoker
                .execute(&ExecuteRequest::new("deploy.ps1").param("Target", "prod"))
                .unwrap();

            let expected = format!("-File\n{}\n-Target\nprod\ndone\n\n", script.display());
            assert_eq!(response.data, expected);
        }

        #[test]
        fn test_nonzero_exit_is_execution_error_with_stderr() {
            let (_dir, invoker) = setup();
            std::fs::write(
                invoker.script_root().join("broken.ps1"),
                "echo 'disk full' >&2\nexit 4\n",
            )
            .unwrap();

            match invoker.execute(&ExecuteRequest::new("broken.ps1")) {
                Err(ScriptgateError::Execution { file, reason }) => {
                    assert_eq!(file, "broken.ps1");
                    assert!(reason.contains("disk full"), "reason was {:?}", reason);
                }
                other => panic!("expected execution error, got {:?}", other),
            }
        }

        #[test]
        fn test_missing_interpreter_is_execution_error() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("a.ps1"), "").unwrap();
            let interpreter = dir.path().join("no-such-interpreter");
            let invoker = ScriptInvoker::new(dir.path(), interpreter, "");

            let result = invoker.execute(&ExecuteRequest::new("a.ps1"));
            assert!(matches!(result, Err(ScriptgateError::Execution { .. })));
        }

        #[test]
        fn test_call_round_trips_json() {
            let (_dir, invoker) = setup();
            std::fs::write(invoker.script_root().join("noop.ps1"), "").unwrap();

            let result = invoker.call(json!({"File": "noop.ps1", "Params": []})).unwrap();
            let script = invoker.script_root().join("noop.ps1");
            assert_eq!(result, json!({"Data": format!("-File\n{}\n", script.display())}));
        }
    }
}
