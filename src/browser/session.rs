//! JSON-lines RPC session with the Playwright helper process.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::playwright::{map_helper_error, map_helper_exit, map_spawn_error};
use crate::{DexError, Result};

/// Id of the launch handshake reply.
const HANDSHAKE_ID: u64 = 0;

/// Bytes of helper stderr kept for error reports.
const STDERR_TAIL: usize = 4096;

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A running helper plus the bookkeeping to match replies to requests.
pub struct HelperSession {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
    stderr: Arc<Mutex<String>>,
    reader: JoinHandle<()>,
}

impl HelperSession {
    /// Spawns `node -e <script> <args...>` and waits for the launch
    /// handshake, bounded by `startup_timeout`.
    pub async fn spawn(
        node_command: &str,
        script: &str,
        args: &[String],
        request_timeout: Duration,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new(node_command);
        cmd.arg("-e")
            .arg(script)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, node_command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DexError::host("helper stdout unavailable"))?;
        let stdin = child.stdin.take();
        let stderr_pipe = child.stderr.take();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (handshake_tx, handshake_rx) = oneshot::channel();
        lock(&pending).insert(HANDSHAKE_ID, handshake_tx);

        let reader = tokio::spawn(read_replies(stdout, pending.clone()));

        let stderr = Arc::new(Mutex::new(String::new()));
        let stderr_sink = stderr.clone();
        tokio::spawn(async move {
            let Some(mut err) = stderr_pipe else {
                return;
            };
            let mut buf = [0u8; 1024];
            while let Ok(n) = err.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                let mut tail = lock(&stderr_sink);
                tail.push_str(&String::from_utf8_lossy(&buf[..n]));
                if tail.len() > STDERR_TAIL {
                    let cut = tail.len() - STDERR_TAIL;
                    let cut = (cut..tail.len())
                        .find(|i| tail.is_char_boundary(*i))
                        .unwrap_or(tail.len());
                    tail.drain(..cut);
                }
            }
        });

        let session = Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(HANDSHAKE_ID + 1),
            request_timeout,
            stderr,
            reader,
        };

        match timeout(startup_timeout, handshake_rx).await {
            Ok(Ok(reply)) => {
                session.into_result::<Value>("launch", reply)?;
                tracing::debug!("playwright helper ready");
                Ok(session)
            }
            Ok(Err(_)) => {
                {
                    let mut child = session.child.lock().await;
                    let _ = timeout(Duration::from_secs(1), child.wait()).await;
                }
                let err = session.exit_error();
                session.shutdown().await;
                Err(err)
            }
            Err(_) => {
                session.shutdown().await;
                Err(DexError::Config(format!(
                    "Playwright helper did not start within {:?}",
                    startup_timeout
                )))
            }
        }
    }

    /// Sends one request and waits for its reply.
    pub async fn call<T: DeserializeOwned>(&self, op: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        request.insert("id".to_string(), json!(id));
        request.insert("op".to_string(), json!(op));

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let mut line = serde_json::to_vec(&Value::Object(request))?;
        line.push(b'\n');
        if let Err(err) = self.write(&line).await {
            lock(&self.pending).remove(&id);
            return Err(err);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => self.into_result(op, reply),
            Ok(Err(_)) => Err(self.exit_error()),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(DexError::host(format!(
                    "Playwright {op} timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }

    /// Asks the helper to close the browser, then makes sure it is gone.
    pub async fn shutdown(self) {
        let _ = timeout(Duration::from_secs(2), self.call::<Value>("close", Value::Null)).await;
        self.stdin.lock().await.take();
        let mut child = self.child.lock().await;
        if timeout(Duration::from_secs(2), child.wait()).await.is_err() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        self.reader.abort();
    }

    async fn write(&self, line: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(DexError::host("Playwright helper is closed"));
        };
        pipe.write_all(line).await?;
        pipe.flush().await?;
        Ok(())
    }

    fn into_result<T: DeserializeOwned>(&self, op: &str, reply: Reply) -> Result<T> {
        if !reply.ok {
            return Err(map_helper_error(op, reply.error.as_deref().unwrap_or("unknown error")));
        }
        Ok(serde_json::from_value(reply.result)?)
    }

    fn exit_error(&self) -> DexError {
        map_helper_exit(&lock(&self.stderr))
    }
}

/// Routes each reply line to its waiting request. Non-reply output (stray
/// `console.log` from the page) is ignored. On EOF every waiter is dropped,
/// which they observe as a helper exit.
async fn read_replies(stdout: tokio::process::ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Ok(reply) = serde_json::from_str::<Reply>(&line) else {
                    tracing::trace!(line = %line, "ignoring non-reply helper output");
                    continue;
                };
                if let Some(tx) = lock(&pending).remove(&reply.id) {
                    let _ = tx.send(reply);
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "failed reading helper output");
                break;
            }
        }
    }
    lock(&pending).clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_parses_both_shapes() {
        let ok: Reply = serde_json::from_str(r#"{"id":3,"ok":true,"result":{"a":1}}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.result["a"], 1);

        let err: Reply = serde_json::from_str(r#"{"id":4,"ok":false,"error":"boom"}"#).unwrap();
        assert!(!err.ok);
        assert_eq!(err.error.as_deref(), Some("boom"));
        assert!(err.result.is_null());
    }

    #[tokio::test]
    async fn spawn_with_missing_binary_is_a_config_error() {
        let result = HelperSession::spawn(
            "definitely-not-a-binary",
            "",
            &[],
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(DexError::Config(_))));
    }
}
