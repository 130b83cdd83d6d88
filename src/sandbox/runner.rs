use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::params::{build_args, ScriptParams};
use super::path::ScriptPolicy;
use super::ScriptRunner;
use crate::config::SandboxConfig;
use crate::error::HiveError;
use crate::policy::Mode;

/// Read chunk size for each output stream.
const CHUNK_SIZE: usize = 8192;

/// Why a running script was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    OutputCeiling,
    Timeout,
}

/// Output gathered from a script run.
#[derive(Debug)]
struct Capture {
    bytes: Vec<u8>,
    terminated: Option<Termination>,
}

/// Runs scripts from the local hive checkout.
pub struct LocalScriptRunner {
    policy: ScriptPolicy,
    interpreter: String,
    max_output_bytes: usize,
    auto_chmod: bool,
    timeout: Option<Duration>,
    scrubbed_env: Vec<String>,
}

impl LocalScriptRunner {
    /// Creates a runner rooted at `root`. A relative root is made absolute
    /// against the current directory.
    pub fn new(root: &Path, config: &SandboxConfig) -> std::io::Result<Self> {
        let root = std::path::absolute(root)?;
        Ok(Self {
            policy: ScriptPolicy::new(
                &root,
                config.allowed_dirs.clone(),
                &config.script_extension,
            ),
            interpreter: config.interpreter.clone(),
            max_output_bytes: config.max_output_bytes,
            auto_chmod: config.auto_chmod,
            timeout: config.timeout(),
            scrubbed_env: config.scrubbed_env.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        self.policy.root()
    }

    /// Runs a script with caller-built arguments (no `--mode` flag).
    ///
    /// Containment, permission normalization and bounded capture apply
    /// exactly as for [`ScriptRunner::execute`].
    pub async fn execute_raw(&self, script_path: &str, args: &[String]) -> Result<String, HiveError> {
        let resolved = self.policy.resolve(script_path)?;
        self.ensure_executable(&resolved, script_path).await?;
        self.spawn_and_capture(&resolved, script_path, args).await
    }

    /// Requires read access; grants the execute bit when it is missing.
    async fn ensure_executable(&self, path: &Path, name: &str) -> Result<(), HiveError> {
        let spawn_error = |source: std::io::Error| HiveError::Spawn {
            script: name.to_string(),
            source,
        };

        // Opening proves read access for the current user
        tokio::fs::File::open(path).await.map_err(spawn_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = tokio::fs::metadata(path).await.map_err(spawn_error)?;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                if !self.auto_chmod {
                    return Err(spawn_error(std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "script is not executable and auto-chmod is disabled",
                    )));
                }
                warn!("Granting execute permission to {}", path.display());
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o111))
                    .await
                    .map_err(spawn_error)?;
            }
        }

        Ok(())
    }

    async fn spawn_and_capture(
        &self,
        script: &Path,
        name: &str,
        args: &[String],
    ) -> Result<String, HiveError> {
        let spawn_error = |source: std::io::Error| HiveError::Spawn {
            script: name.to_string(),
            source,
        };

        debug!("Running {} {} {}", self.interpreter, script.display(), args.join(" "));

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .args(args)
            .current_dir(self.policy.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for var in &self.scrubbed_env {
            cmd.env_remove(var);
        }

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stderr not captured")))?;

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut capture = capture_bounded(stdout, stderr, self.max_output_bytes, deadline)
            .await
            .map_err(spawn_error)?;

        let status = match (capture.terminated, deadline) {
            (Some(_), _) => {
                request_kill(&mut child, name);
                child.wait().await
            }
            // Streams closed but the process may linger; the deadline still applies
            (None, Some(at)) => match tokio::time::timeout_at(at, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    capture.terminated = Some(Termination::Timeout);
                    request_kill(&mut child, name);
                    child.wait().await
                }
            },
            (None, None) => child.wait().await,
        }
        .map_err(spawn_error)?;

        let output = String::from_utf8_lossy(&capture.bytes).into_owned();

        if let Some(cause) = capture.terminated {
            warn!(
                "Terminated {name} ({cause:?}) after {} bytes of output",
                capture.bytes.len()
            );
            return Ok(output);
        }

        if status.success() {
            info!("Script {name} finished ({} bytes of output)", capture.bytes.len());
            Ok(output)
        } else {
            warn!("Script {name} exited with {status}");
            Err(HiveError::ScriptFailed {
                script: name.to_string(),
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl ScriptRunner for LocalScriptRunner {
    async fn execute(
        &self,
        mode: Mode,
        script_path: &str,
        params: &ScriptParams,
    ) -> Result<String, HiveError> {
        let args = build_args(mode, params);
        self.execute_raw(script_path, &args).await
    }
}

/// Sends the kill signal. Returns false (and warns) when it could not be sent.
fn request_kill(child: &mut Child, name: &str) -> bool {
    match child.start_kill() {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to kill {name}: {e}");
            false
        }
    }
}

/// Reads both streams into one buffer in arrival order.
///
/// Stops early once the buffer exceeds `max_bytes` (the result is cut back
/// to `max_bytes`) or the deadline passes.
async fn capture_bounded<O, E>(
    mut stdout: O,
    mut stderr: E,
    max_bytes: usize,
    deadline: Option<Instant>,
) -> std::io::Result<Capture>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    let mut err_buf = vec![0u8; CHUNK_SIZE];
    let mut out_open = true;
    let mut err_open = true;
    let mut terminated = None;

    let expiry = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read? {
                0 => out_open = false,
                n => bytes.extend_from_slice(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read? {
                0 => err_open = false,
                n => bytes.extend_from_slice(&err_buf[..n]),
            },
            _ = &mut expiry => {
                terminated = Some(Termination::Timeout);
                break;
            }
        }
        if bytes.len() > max_bytes {
            terminated = Some(Termination::OutputCeiling);
            break;
        }
    }

    if terminated.is_some() {
        bytes.truncate(max_bytes);
    }
    Ok(Capture { bytes, terminated })
}

/// Writes a script file with the given permission bits. Test helper.
#[cfg(test)]
pub(crate) fn write_script(root: &Path, rel: &str, body: &str, mode: u32) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}
