//! Daemon control channel.
//!
//! Every daemon exposes a Unix stream socket speaking line-delimited
//! JSON-RPC: one request object per line, one reply object per line.
//!
//! ```text
//! → {"method":"dumpdiagbasic","params":["basic","lldp"],"id":7}
//! ← {"result":"...","error":null,"id":7}
//! ```
//!
//! Sockets live in a run directory as `<daemon>.ctl`, or as
//! `<daemon>.<pid>.ctl` with the pid read from `<daemon>.pid`. A resolved
//! path is cached per daemon and dropped after any contact failure, so a
//! restarted daemon is found again on the next request.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use crate::error::CollectorError;
use crate::types::{FEATURE_NAME_MAX, VlogDestination, VlogLevel};

/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Bad arity or invalid argument.
pub const INVALID_PARAMS: i64 = -32602;
/// The handler ran but could not produce data.
pub const HANDLER_FAILED: i64 = 1;

/// Largest accepted frame.
pub const MAX_FRAME_BYTES: u64 = 16 * 1024 * 1024;

/// Highest pid accepted from a pid file.
const MAX_PID: u32 = 65536;

/// Diag-dump request method.
pub const DIAG_DUMP_METHOD: &str = "dumpdiagbasic";

// =============================================================================
// Wire types
// =============================================================================

/// A control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Method name.
    pub method: String,
    /// String parameters.
    #[serde(default)]
    pub params: Vec<String>,
    /// Request identifier echoed in the reply.
    pub id: u64,
}

/// Error half of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    /// Negative codes are protocol errors; zero or positive are handler failures.
    pub code: i64,
    /// Error text.
    pub message: String,
}

impl ReplyError {
    /// Creates a reply error.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true for protocol-level rejections.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        self.code < 0
    }
}

/// A control reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Successful result text.
    pub result: Option<String>,
    /// Failure.
    pub error: Option<ReplyError>,
    /// Identifier of the answered request.
    pub id: u64,
}

impl Reply {
    /// Creates a success reply.
    #[must_use]
    pub fn ok(id: u64, result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            error: None,
            id,
        }
    }

    /// Creates an error reply.
    #[must_use]
    pub const fn err(id: u64, error: ReplyError) -> Self {
        Self {
            result: None,
            error: Some(error),
            id,
        }
    }
}

async fn write_frame<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Sends one request and reads one reply over an established stream.
///
/// # Errors
/// Returns an I/O error on transport failure, a closed stream or a malformed reply.
pub async fn exchange<S>(stream: &mut S, request: &Request) -> std::io::Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(stream, request).await?;

    let mut line = String::new();
    let mut reader = BufReader::new((&mut *stream).take(MAX_FRAME_BYTES));
    if reader.read_line(&mut line).await? == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "control channel closed before reply",
        ));
    }

    let reply: Reply = serde_json::from_str(line.trim_end())?;
    if reply.id != request.id {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("reply id {} does not match request id {}", reply.id, request.id),
        ));
    }
    Ok(reply)
}

// =============================================================================
// Socket resolution
// =============================================================================

/// Resolves the control socket of `daemon` under `run_dir`.
///
/// # Errors
/// Returns `NotFound` if neither socket form exists, `InvalidData` for a bad pid file.
pub fn resolve_socket(run_dir: &Path, daemon: &str) -> std::io::Result<PathBuf> {
    let direct = run_dir.join(format!("{daemon}.ctl"));
    if direct.exists() {
        return Ok(direct);
    }

    let pid_file = run_dir.join(format!("{daemon}.pid"));
    let text = std::fs::read_to_string(&pid_file)?;
    let pid: u32 = text.trim().parse().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} does not contain a pid", pid_file.display()),
        )
    })?;
    if pid == 0 || pid > MAX_PID {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("pid {pid} out of range"),
        ));
    }

    let by_pid = run_dir.join(format!("{daemon}.{pid}.ctl"));
    if by_pid.exists() {
        Ok(by_pid)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", by_pid.display()),
        ))
    }
}

// =============================================================================
// ControlClient
// =============================================================================

/// Client side of the control channel.
#[derive(Debug)]
pub struct ControlClient {
    run_dir: PathBuf,
    channels: Mutex<HashMap<String, PathBuf>>,
    next_id: AtomicU64,
}

impl ControlClient {
    /// Creates a client resolving sockets under `run_dir`.
    #[must_use]
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the run directory.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Returns the cached or freshly resolved socket path for `daemon`.
    ///
    /// # Errors
    /// [`CollectorError::Unreachable`] if no socket can be found.
    pub fn channel_for(&self, daemon: &str) -> Result<PathBuf, CollectorError> {
        if let Some(path) = self.channels.lock().get(daemon) {
            return Ok(path.clone());
        }
        let path = resolve_socket(&self.run_dir, daemon)
            .map_err(|e| CollectorError::unreachable(daemon, e.to_string()))?;
        self.channels
            .lock()
            .insert(daemon.to_string(), path.clone());
        Ok(path)
    }

    /// Drops the cached socket path for `daemon`.
    pub fn invalidate(&self, daemon: &str) {
        if self.channels.lock().remove(daemon).is_some() {
            tracing::debug!(daemon = %daemon, "control channel invalidated");
        }
    }

    /// Returns true if a socket path is cached for `daemon`.
    #[must_use]
    pub fn is_cached(&self, daemon: &str) -> bool {
        self.channels.lock().contains_key(daemon)
    }

    /// Performs one request with a hard deadline and returns the raw reply.
    ///
    /// # Errors
    /// [`CollectorError::Unreachable`] or [`CollectorError::Timeout`]; either
    /// one drops the cached socket path.
    pub async fn call(
        &self,
        daemon: &str,
        method: &str,
        params: Vec<String>,
        timeout: Duration,
    ) -> Result<Reply, CollectorError> {
        let request = Request {
            method: method.to_string(),
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let outcome = match self.channel_for(daemon) {
            Ok(path) => {
                let attempt = async {
                    let mut stream = UnixStream::connect(&path).await?;
                    exchange(&mut stream, &request).await
                };
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(e)) => Err(CollectorError::unreachable(daemon, e.to_string())),
                    Err(_) => Err(CollectorError::Timeout {
                        daemon: daemon.to_string(),
                        after: timeout,
                    }),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            tracing::warn!(daemon = %daemon, method = %method, error = %e, "control request failed");
            if e.invalidates_channel() {
                self.invalidate(daemon);
            }
        }
        outcome
    }

    /// Performs one request and converts any error reply into a failure.
    ///
    /// # Errors
    /// As [`ControlClient::call`], plus [`CollectorError::DaemonError`] for an
    /// error reply.
    pub async fn call_ok(
        &self,
        daemon: &str,
        method: &str,
        params: Vec<String>,
        timeout: Duration,
    ) -> Result<String, CollectorError> {
        let reply = self.call(daemon, method, params, timeout).await?;
        match reply.error {
            Some(error) => Err(CollectorError::DaemonError {
                daemon: daemon.to_string(),
                code: error.code,
                message: error.message,
            }),
            None => Ok(reply.result.unwrap_or_default()),
        }
    }
}

// =============================================================================
// ControlServer
// =============================================================================

/// Server-side command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles one invocation. Arity has already been checked.
    async fn handle(&self, params: &[String]) -> Result<String, ReplyError>;
}

/// Adapts a synchronous closure into a [`CommandHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&[String]) -> Result<String, ReplyError> + Send + Sync,
{
    async fn handle(&self, params: &[String]) -> Result<String, ReplyError> {
        (self.0)(params)
    }
}

struct Command {
    min_args: usize,
    max_args: usize,
    handler: Arc<dyn CommandHandler>,
}

/// Daemon-side live vlog levels, shared with the daemon's logging setup.
#[derive(Debug, Clone, Default)]
pub struct DaemonVlog {
    inner: Arc<RwLock<BTreeMap<VlogDestination, VlogLevel>>>,
}

impl DaemonVlog {
    /// Returns the effective level for `destination`.
    #[must_use]
    pub fn get(&self, destination: VlogDestination) -> VlogLevel {
        self.inner
            .read()
            .get(&destination)
            .copied()
            .unwrap_or_default()
    }

    /// Sets the level for `destination`.
    pub fn set(&self, destination: VlogDestination, level: VlogLevel) {
        self.inner.write().insert(destination, level);
    }
}

/// Parses a `<destination>:<level>` vlog argument.
///
/// # Errors
/// Returns [`INVALID_PARAMS`] for an unknown destination or level.
pub fn parse_vlog_arg(arg: &str) -> Result<(VlogDestination, VlogLevel), ReplyError> {
    let invalid = || ReplyError::new(INVALID_PARAMS, format!("invalid vlog setting '{arg}'"));
    let (dest, level) = arg.split_once(':').ok_or_else(invalid)?;
    let dest = dest.parse().map_err(|_| invalid())?;
    let level = level.parse().map_err(|_| invalid())?;
    Ok((dest, level))
}

/// Dispatch table of named commands served over a control socket.
///
/// # Toyota Way: Heijunka (平準化)
/// Every connection is served by its own task; a slow handler delays only
/// its own client.
#[derive(Default)]
pub struct ControlServer {
    commands: HashMap<String, Command>,
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.commands.keys().collect();
        names.sort();
        f.debug_struct("ControlServer").field("commands", &names).finish()
    }
}

impl ControlServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command accepting between `min_args` and `max_args` parameters.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        min_args: usize,
        max_args: usize,
        handler: Arc<dyn CommandHandler>,
    ) {
        self.commands.insert(
            name.into(),
            Command {
                min_args,
                max_args,
                handler,
            },
        );
    }

    /// Registers a synchronous closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, min_args: usize, max_args: usize, f: F)
    where
        F: Fn(&[String]) -> Result<String, ReplyError> + Send + Sync + 'static,
    {
        self.register(name, min_args, max_args, Arc::new(FnHandler(f)));
    }

    /// Adds the built-in diag-dump command.
    ///
    /// `provider` returns the basic diagnostic text for a feature, or `None`
    /// when the feature has nothing to report.
    #[must_use]
    pub fn with_diag_dump<F>(mut self, provider: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.register_fn(DIAG_DUMP_METHOD, 0, usize::MAX, move |params| {
            let feature = params.get(1).map_or("", String::as_str);
            let valid = params.len() == 2
                && params[0] == "basic"
                && (1..=FEATURE_NAME_MAX).contains(&feature.len());
            if !valid {
                return Err(ReplyError::new(
                    INVALID_PARAMS,
                    format!("Diagdump failed for feature {feature}, reason: invalid parameter"),
                ));
            }
            provider(feature).ok_or_else(|| {
                ReplyError::new(
                    HANDLER_FAILED,
                    format!("{feature} feature failed to provide basic diagnostic data"),
                )
            })
        });
        self
    }

    /// Adds the built-in `vlog/set` and `vlog/list` commands.
    #[must_use]
    pub fn with_vlog(mut self, levels: DaemonVlog) -> Self {
        let setter = levels.clone();
        self.register_fn("vlog/set", 1, 1, move |params| {
            let (dest, level) = parse_vlog_arg(&params[0])?;
            setter.set(dest, level);
            Ok(String::new())
        });
        self.register_fn("vlog/list", 0, 0, move |_| {
            Ok(VlogDestination::ALL
                .iter()
                .map(|d| format!("{}:{}", d, levels.get(*d).token()))
                .collect::<Vec<_>>()
                .join(" "))
        });
        self
    }

    /// Returns true if `method` is registered.
    #[must_use]
    pub fn handles(&self, method: &str) -> bool {
        self.commands.contains_key(method)
    }

    /// Dispatches one request.
    pub async fn dispatch(&self, request: &Request) -> Reply {
        let Some(command) = self.commands.get(&request.method) else {
            return Reply::err(
                request.id,
                ReplyError::new(METHOD_NOT_FOUND, format!("unknown command '{}'", request.method)),
            );
        };

        let argc = request.params.len();
        if argc < command.min_args || argc > command.max_args {
            return Reply::err(
                request.id,
                ReplyError::new(
                    INVALID_PARAMS,
                    format!(
                        "'{}' command takes {}..{} arguments, got {argc}",
                        request.method, command.min_args, command.max_args
                    ),
                ),
            );
        }

        match command.handler.handle(&request.params).await {
            Ok(result) => Reply::ok(request.id, result),
            Err(error) => Reply::err(request.id, error),
        }
    }

    /// Serves requests from one connected stream until it closes.
    ///
    /// # Errors
    /// Returns an I/O error if the stream fails mid-conversation.
    pub async fn serve_stream<S>(&self, stream: S) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.dispatch(&request).await,
                Err(e) => Reply::err(0, ReplyError::new(INVALID_PARAMS, e.to_string())),
            };
            write_frame(&mut writer, &reply).await?;
        }
        Ok(())
    }

    /// Binds `path` and serves connections in the background.
    ///
    /// A stale socket file at `path` is replaced.
    ///
    /// # Errors
    /// Returns an I/O error if the socket cannot be bound.
    pub fn bind(self, path: impl Into<PathBuf>) -> std::io::Result<RunningServer> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(&path)?;
        tracing::info!(socket = %path.display(), "control server listening");

        let server = Arc::new(self);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let server = Arc::clone(&server);
                        tokio::spawn(async move {
                            if let Err(e) = server.serve_stream(stream).await {
                                tracing::debug!(error = %e, "control connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "control accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        });

        Ok(RunningServer { path, task })
    }
}

/// Handle to a bound [`ControlServer`]. Dropping it stops the server.
#[derive(Debug)]
pub struct RunningServer {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl RunningServer {
    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}
