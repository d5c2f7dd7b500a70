//! Provider process management (spawn, handshake, request/response, teardown).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Inbound, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult, RequestId, Tool,
};

/// Default timeout for a single request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum size of one inbound line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long a provider gets to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How to launch a provider process.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl LaunchConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Launch a Python provider script through `uv run`.
    ///
    /// The script's file stem becomes the provider name.
    pub fn uv_script(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = path
            .canonicalize()
            .map_err(|_| Error::ScriptNotFound(path.display().to_string()))?;
        if !path.is_file() {
            return Err(Error::ScriptNotFound(path.display().to_string()));
        }

        let (Some(dir), Some(file), Some(stem)) =
            (path.parent(), path.file_name(), path.file_stem())
        else {
            return Err(Error::ScriptNotFound(path.display().to_string()));
        };

        Ok(Self::new(stem.to_string_lossy(), "uv").with_args([
            "--directory".to_string(),
            dir.display().to_string(),
            "run".to_string(),
            file.to_string_lossy().into_owned(),
        ]))
    }
}

/// Provider stdio, locked as a unit so one request and its response are
/// never interleaved with another caller's exchange.
struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Bytes of a line not yet terminated. Kept across reads so a request
    /// abandoned on timeout leaves the stream aligned for the next one.
    partial: Vec<u8>,
    /// Set after an oversized line; the rest of it is dropped unread.
    discarding: bool,
}

impl Pipes {
    fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout),
            partial: Vec::new(),
            discarding: false,
        }
    }

    /// Read the next complete line, without its terminator.
    ///
    /// Cancel-safe: bytes are moved out of the reader only after the await
    /// point, so dropping this future loses nothing. A line longer than
    /// [`MAX_OUTPUT_SIZE`] is rejected as soon as the limit is crossed and
    /// its remainder skipped.
    async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let chunk = self.stdout.fill_buf().await?;
            if chunk.is_empty() {
                return Err(Error::ProviderExited);
            }

            let newline = chunk.iter().position(|&b| b == b'\n');
            let consumed = newline.map_or(chunk.len(), |end| end + 1);
            let discarding = self.discarding;
            if !discarding {
                self.partial.extend_from_slice(&chunk[..consumed]);
            }
            self.stdout.consume(consumed);

            if newline.is_some() {
                self.discarding = false;
                if discarding {
                    continue;
                }
                let mut line = std::mem::take(&mut self.partial);
                line.pop();
                if line.len() > MAX_OUTPUT_SIZE {
                    return Err(Error::OutputTooLarge {
                        size: line.len(),
                        max: MAX_OUTPUT_SIZE,
                    });
                }
                return Ok(line);
            }

            if !discarding && self.partial.len() > MAX_OUTPUT_SIZE {
                let size = self.partial.len();
                self.partial.clear();
                self.discarding = true;
                return Err(Error::OutputTooLarge {
                    size,
                    max: MAX_OUTPUT_SIZE,
                });
            }
        }
    }
}

/// Handle to a running provider process.
pub struct Connection {
    config: LaunchConfig,
    process: Mutex<Child>,
    pipes: Mutex<Pipes>,
    next_id: AtomicI64,
    server_info: OnceLock<InitializeResult>,
}

impl Connection {
    /// Spawn a provider process and complete the handshake.
    pub async fn connect(config: LaunchConfig) -> Result<Self> {
        let connection = Self::spawn(config).await?;
        connection.initialize().await?;
        Ok(connection)
    }

    /// Spawn a provider process without performing the handshake.
    pub async fn spawn(config: LaunchConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        tracing::debug!(provider = %config.name, command = %config.command, "provider spawned");

        Ok(Self {
            config,
            process: Mutex::new(process),
            pipes: Mutex::new(Pipes::new(stdin, stdout)),
            next_id: AtomicI64::new(1),
            server_info: OnceLock::new(),
        })
    }

    /// Get the provider name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Perform the MCP handshake.
    pub async fn initialize(&self) -> Result<&InitializeResult> {
        if let Some(info) = self.server_info.get() {
            return Ok(info);
        }

        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify(JsonRpcNotification::new("notifications/initialized"))
            .await?;

        tracing::debug!(
            provider = %self.config.name,
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "provider handshake complete"
        );

        Ok(self.server_info.get_or_init(|| result))
    }

    /// Fetch the provider's current tool catalog, following pagination.
    ///
    /// Nothing is cached; every call asks the provider.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_initialized()?;

        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let result: ListToolsResult = self
                .request("tools/list", Some(ListToolsParams { cursor }))
                .await?;
            tools.extend(result.tools);
            match result.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` is returned as [`Error::ToolCallFailed`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }

        Ok(result)
    }

    /// Close the provider's stdin and wait briefly for it to exit, killing it
    /// if it does not.
    pub async fn shutdown(self) -> Result<()> {
        let name = self.config.name;
        drop(self.pipes.into_inner());

        let mut process = self.process.into_inner();
        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider = %name, %status, "provider exited");
            }
            _ => {
                tracing::debug!(provider = %name, "provider did not exit, killing");
                process.kill().await?;
            }
        }
        Ok(())
    }

    // --- Internal methods ---

    fn ensure_initialized(&self) -> Result<()> {
        if self.server_info.get().is_none() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }
        let request_json = serde_json::to_string(&request)?;

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &request_json).await?;

        let response = timeout(self.config.timeout, self.read_response(&mut pipes, &id))
            .await
            .map_err(|_| Error::Timeout {
                method: method.to_string(),
            })??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        let json = serde_json::to_string(&notification)?;
        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &json).await
    }

    /// Read until the response for `id` arrives.
    ///
    /// Notifications, provider-initiated requests, unparseable lines and
    /// stale responses from exchanges that previously timed out are skipped.
    async fn read_response(&self, pipes: &mut Pipes, id: &RequestId) -> Result<JsonRpcResponse> {
        loop {
            let line = pipes.next_line().await?;
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let inbound = match Inbound::parse(line) {
                Ok(inbound) => inbound,
                Err(e) => {
                    tracing::warn!(provider = %self.config.name, error = %e, "skipping unparseable line");
                    continue;
                }
            };

            match inbound {
                Inbound::Response(response) if &response.id == id => return Ok(response),
                Inbound::Response(response) => {
                    tracing::warn!(
                        provider = %self.config.name,
                        expected = ?id,
                        got = ?response.id,
                        "discarding stale response"
                    );
                }
                Inbound::Notification { method } => {
                    tracing::trace!(provider = %self.config.name, %method, "skipping notification");
                }
                Inbound::Request { id, method } => {
                    tracing::debug!(
                        provider = %self.config.name,
                        request = ?id,
                        %method,
                        "ignoring provider request"
                    );
                }
            }
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, json: &str) -> Result<()> {
    stdin.write_all(json.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}
