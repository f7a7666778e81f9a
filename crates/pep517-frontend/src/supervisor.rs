//! Owns the backend host child process: spawning, the handshake, sending requests and
//! waiting for their response files, and teardown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::wire::{Request, Response};

const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Embedded so the host script travels with the binary rather than needing a
/// separate install step.
static HOST_SOURCE: &str = include_str!("host.py");

/// One child process running `host.py`, plus everything needed to drive it.
#[derive(Debug)]
pub struct ProcessSupervisor {
    child: Child,
    stdin: ChildStdin,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
    response_dir: PathBuf,
    reuse: bool,
}

impl ProcessSupervisor {
    /// Spawn the interpreter against an on-disk copy of `host.py`, wait for the
    /// `started backend ` handshake line, and return a ready-to-use supervisor.
    #[instrument(skip(backend_paths), fields(%backend_spec))]
    pub async fn spawn(
        interpreter: &Path,
        backend_paths: &[PathBuf],
        backend_spec: &str,
        reuse: bool,
        response_dir: PathBuf,
    ) -> Result<Self, Error> {
        let host_script = response_dir.join("host.py");
        fs_err::tokio::write(&host_script, HOST_SOURCE).await?;

        let mut pythonpath = backend_paths
            .iter()
            .map(|p| p.as_os_str().to_owned())
            .collect::<Vec<_>>()
            .join(std::ffi::OsStr::new(":"));
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            if !pythonpath.is_empty() {
                pythonpath.push(":");
            }
            pythonpath.push(existing);
        }

        let mut command = Command::new(interpreter);
        command
            .arg(&host_script)
            .arg(if reuse { "True" } else { "False" })
            .arg(backend_spec)
            .env("PYTHONPATH", pythonpath)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::BackendStartupFailed {
            err: e.to_string(),
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        spawn_drain(stdout, Arc::clone(&stdout_buf));
        spawn_drain(stderr, Arc::clone(&stderr_buf));

        let mut supervisor = Self {
            child,
            stdin,
            stdout_buf,
            stderr_buf,
            response_dir,
            reuse,
        };

        supervisor.await_handshake().await?;
        Ok(supervisor)
    }

    async fn await_handshake(&mut self) -> Result<(), Error> {
        loop {
            {
                let out = self.stdout_buf.lock().await;
                if out.contains("started backend ") {
                    debug!("backend host handshake observed");
                    return Ok(());
                }
            }
            if let Some(status) = self.child.try_wait()? {
                let err = self.stderr_buf.lock().await.clone();
                return Err(Error::BackendStartupFailed {
                    err: format!("host exited with {status} before handshake: {err}"),
                });
            }
            sleep(RESPONSE_POLL_INTERVAL).await;
        }
    }

    /// Send one request and wait for its response file to appear (or the child to
    /// exit without producing one). Returns the decoded response plus the stdio
    /// captured while the command was in flight.
    #[instrument(skip(self, kwargs), fields(%cmd))]
    pub async fn send(
        &mut self,
        cmd: &str,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<(Response, String, String), Error> {
        let result_path = self
            .response_dir
            .join(format!("pep517_{cmd}-{}.json", Uuid::new_v4()));

        let out_before = self.stdout_buf.lock().await.len();
        let err_before = self.stderr_buf.lock().await.len();

        let request = Request::new(cmd, kwargs, result_path.clone());
        let encoded = request.encode()?;
        self.stdin.write_all(&encoded).await?;
        self.stdin.flush().await?;

        loop {
            if result_path.is_file() {
                break;
            }
            if let Some(status) = self.child.try_wait()? {
                let out = slice_since(&self.stdout_buf, out_before).await;
                let err = slice_since(&self.stderr_buf, err_before).await;
                if result_path.is_file() {
                    break;
                }
                return Err(Error::ResponseMissing {
                    path: result_path,
                    out,
                    err: format!("{err}\n(host exited with {status})"),
                });
            }
            sleep(RESPONSE_POLL_INTERVAL).await;
        }

        let response = Response::decode(&result_path)?;
        let _ = fs_err::tokio::remove_file(&result_path).await;
        let out = slice_since(&self.stdout_buf, out_before).await;
        let err = slice_since(&self.stderr_buf, err_before).await;
        Ok((response, out, err))
    }

    /// Send `_exit` if the child is still alive, then wait for it to terminate,
    /// killing it if it overstays a grace period. Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        if self.child.try_wait()?.is_none() {
            let result_path = self.response_dir.join(format!("pep517__exit-{}.json", Uuid::new_v4()));
            let request = Request::new("_exit", BTreeMap::new(), result_path.clone());
            if let Ok(encoded) = request.encode() {
                let _ = self.stdin.write_all(&encoded).await;
                let _ = self.stdin.flush().await;
            }
            let _ = fs_err::tokio::remove_file(&result_path).await;

            let waited = tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await;
            if waited.is_err() {
                warn!("backend host did not exit within grace period, killing");
                self.child.start_kill()?;
                let _ = self.child.wait().await;
            }
        }
        Ok(())
    }

}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let _ = fs_err::remove_file(self.response_dir.join("host.py"));
    }
}

async fn slice_since(buf: &Arc<Mutex<String>>, start: usize) -> String {
    let guard = buf.lock().await;
    guard.get(start..).unwrap_or_default().to_string()
}

fn spawn_drain<R>(mut reader: R, buf: Arc<Mutex<String>>)
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&chunk[..n]);
                    buf.lock().await.push_str(&text);
                }
            }
        }
    });
}
