//! Stdio backend for the external Kavion MCP server.
//!
//! The server is a node binary speaking line-delimited JSON-RPC on
//! stdin/stdout, with human-readable startup banners mixed into stdout.
//! [`Pipe`] owns the request/response loop over an arbitrary stream pair;
//! [`Backend`] spawns the real child process and wires its pipes in.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::rpc::{self, IdSequence, Notification, Request, Response, StdoutLine};
use crate::{Error, Result};

const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// JSON-RPC request/response loop over a reader/writer pair.
///
/// One reader task routes stdout lines: banners go to the log, responses
/// go to the pending request that is waiting on their id. A watch flag
/// tracks readiness, set either by the ready banner or by a completed
/// initialize handshake.
pub struct Pipe {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    ids: IdSequence,
    ready: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl Pipe {
    /// Start the loop over `reader`/`writer`. `ready_banner` is the
    /// stdout substring that marks the server ready before any request
    /// has been answered.
    pub fn start<R, W>(reader: R, writer: W, ready_banner: String) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (ready, _) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            reader,
            ready_banner,
            pending.clone(),
            ready.clone(),
            closed.clone(),
        ));

        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            ids: IdSequence::new(),
            ready,
            closed,
            reader_task,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow() && !self.closed.load(Ordering::Acquire)
    }

    /// Block until the server is ready, up to `timeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ServerGone);
        }
        let mut rx = self.ready.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::ServerGone),
            Err(_) => Err(Error::NotReady),
        }
    }

    /// Send a request and await its response.
    pub async fn request_raw(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Response> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ServerGone);
        }

        let id = self.ids.next();
        let line = Request::new(id, method, params).to_line()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        if let Err(err) = self.write_line(&line).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // The reader task dropped the sender: the server went away.
            Ok(Err(_)) => Err(Error::ServerGone),
            Err(_) => {
                // A late response for this id will be dropped by the
                // reader as unknown.
                self.pending.lock().unwrap().remove(&id);
                Err(Error::Timeout(timeout))
            }
        }
    }

    /// Send a request and unwrap its result.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.request_raw(method, params, timeout).await?.into_result()
    }

    pub async fn notify(&self, notification: &Notification) -> Result<()> {
        self.write_line(&notification.to_line()?).await
    }

    /// Run the initialize handshake: send `initialize`, mark the pipe
    /// ready on success, then send `notifications/initialized`.
    pub async fn initialize(&self, timeout: Duration) -> Result<Value> {
        let params = rpc::initialize_params(CLIENT_NAME, CLIENT_VERSION);
        let info = self.request("initialize", Some(params), timeout).await?;
        self.ready.send_replace(true);
        self.notify(&Notification::initialized()).await?;
        info!(server = %summary(&info), "MCP server initialized");
        Ok(info)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop<R>(
    reader: R,
    ready_banner: String,
    pending: Pending,
    ready: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read from MCP server stdout");
                break;
            }
        };

        match rpc::classify_line(&line) {
            StdoutLine::Response(response) => {
                let Some(id) = response.numeric_id() else {
                    warn!("dropping response without a numeric id");
                    continue;
                };
                let waiter = pending.lock().unwrap().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(id, "dropping response for unknown request id"),
                }
            }
            StdoutLine::Banner(banner) => {
                if banner.is_empty() {
                    continue;
                }
                if banner.contains(&ready_banner) {
                    info!("MCP server is ready");
                    ready.send_replace(true);
                } else {
                    debug!(target: "kavion_mcp::server", "{banner}");
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    ready.send_replace(false);
    // Wake everyone still waiting: dropping the senders errors the
    // receiving oneshot ends.
    pending.lock().unwrap().clear();
}

fn summary(info: &Value) -> String {
    let name = info["serverInfo"]["name"].as_str().unwrap_or("unknown");
    let version = info["serverInfo"]["version"].as_str().unwrap_or("?");
    format!("{name} v{version}")
}

/// A spawned Kavion MCP server child process with its [`Pipe`].
pub struct Backend {
    pipe: Arc<Pipe>,
    child: tokio::sync::Mutex<Child>,
}

impl Backend {
    /// Spawn the server process without waiting for it to become ready.
    pub fn spawn(config: &Config) -> Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(config.server_args())
            .envs(config.server_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(command = %config.command, args = ?config.server_args(), "starting MCP server");
        let mut child = command.spawn()?;

        let stdin = child.stdin.take().ok_or(Error::ServerGone)?;
        let stdout = child.stdout.take().ok_or(Error::ServerGone)?;
        let stderr = child.stderr.take().ok_or(Error::ServerGone)?;

        // The server logs to stderr as well; keep it visible.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "kavion_mcp::server", "{line}");
            }
        });

        let pipe = Pipe::start(stdout, stdin, config.ready_banner.clone());

        Ok(Self {
            pipe: Arc::new(pipe),
            child: tokio::sync::Mutex::new(child),
        })
    }

    /// Spawn and complete the initialize handshake.
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = Self::spawn(config)?;
        backend.pipe.initialize(config.init_timeout).await?;
        Ok(backend)
    }

    pub fn pipe(&self) -> Arc<Pipe> {
        self.pipe.clone()
    }

    /// Wait for the child to exit.
    pub async fn wait(&self) -> std::io::Result<std::process::ExitStatus> {
        self.child.lock().await.wait().await
    }

    pub async fn kill(&self) {
        let _ = self.child.lock().await.kill().await;
    }
}
