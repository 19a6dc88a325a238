/// mpv playback engine, driven over its JSON IPC socket.
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← PendingRequest via mpsc, one JSON line each
///         └── reader_task   ← JSON lines from mpv
///                                ├── reply (has request_id) → matching oneshot
///                                └── event (end-file, ...)  → event channel
/// ```
///
/// `MpvHandle` is cheap to clone and is what commands go through.
/// `MpvDriver` owns the child process. `MpvPlayer` ties both together behind
/// [`PlaybackDriver`] and respawns mpv if it died between two commands.
///
/// Unix uses a domain socket, Windows a named pipe `\\.\pipe\<name>`.
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use xradio_proto::platform;

use crate::driver::{DriverOptions, PlaybackDriver};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // one JSON line, '\n' included
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// Unsolicited message from mpv (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `reason` of an `end-file` event: eof, stop, quit, error, redirect.
    pub fn end_file_reason(&self) -> Option<&str> {
        if self.event_name()? != "end-file" {
            return None;
        }
        self.raw.get("reason")?.as_str()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_url(&self, url: &str) -> anyhow::Result<()> {
        debug!("mpv: loadfile {}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    /// Load `url` with the pause property already set, so a paused player
    /// never makes a sound from the new file. mpv keeps `pause` across loads.
    pub async fn open(&self, url: &str, paused: bool) -> anyhow::Result<()> {
        self.set_pause(paused).await?;
        self.load_url(url).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn quit(&self) -> anyhow::Result<()> {
        self.send(json!(["quit"])).await?;
        Ok(())
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    pub socket_name: String,
    process: Option<tokio::process::Child>,
    options: DriverOptions,
}

/// Command line for a fresh mpv process.
fn spawn_args(options: &DriverOptions) -> Vec<String> {
    let mut args = vec![
        "--idle=yes".to_string(),
        platform::mpv_socket_arg(),
        format!(
            "--volume={}",
            (options.volume * 100.0).clamp(0.0, 100.0).round() as i64
        ),
    ];
    args.extend(options.extra_args.iter().cloned());
    args
}

impl MpvDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            process: None,
            options,
        }
    }

    pub fn started(&self) -> bool {
        self.process.is_some()
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv process exited with code: {}", code),
                    None => warn!("mpv process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        if let Some(parent) = stderr_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = tokio::process::Command::new(&mpv_binary)
            .args(spawn_args(&self.options))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        info!("mpv: spawning new process");
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel, filled by the writer and drained by the reader
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let Some(tx) = pending.lock().await.remove(&req_id) else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                        continue;
                    };
                    let result = if val["error"].as_str() == Some("success") {
                        Ok(val)
                    } else {
                        let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                        debug!("mpv reader: response req={} err={}", req_id, err);
                        Err(anyhow::anyhow!("mpv error: {}", err))
                    };
                    let _ = tx.send(result);
                } else {
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

/// Log what mpv reports about playback. Track advance is timer driven, so
/// events are informational only.
fn spawn_event_logger(mut rx: mpsc::Receiver<MpvEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.end_file_reason() {
                Some("error") => warn!(
                    "mpv: playback error: {}",
                    event.raw["file_error"].as_str().unwrap_or("unknown")
                ),
                Some(reason) => debug!("mpv: end-file ({})", reason),
                None => debug!("mpv: event {}", event.event_name().unwrap_or("?")),
            }
        }
    });
}

// ── PlaybackDriver ────────────────────────────────────────────────────────────

struct MpvState {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
}

pub struct MpvPlayer {
    state: Mutex<MpvState>,
}

impl MpvPlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MpvState {
                driver: MpvDriver::new(DriverOptions::default()),
                handle: None,
            }),
        }
    }

    async fn connect(state: &mut MpvState) -> anyhow::Result<MpvHandle> {
        let (event_tx, event_rx) = mpsc::channel(64);
        spawn_event_logger(event_rx);
        let handle = state.driver.spawn_and_connect(event_tx).await?;
        state.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Current handle, respawning mpv when the process went away.
    async fn handle(&self) -> anyhow::Result<MpvHandle> {
        let mut state = self.state.lock().await;
        if !state.driver.started() {
            anyhow::bail!("mpv is not initialised");
        }
        if state.driver.process_alive() {
            if let Some(handle) = state.handle.clone() {
                return Ok(handle);
            }
        }
        warn!("mpv: process gone, respawning");
        Self::connect(&mut state).await
    }
}

impl Default for MpvPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackDriver for MpvPlayer {
    async fn init(&self, options: &DriverOptions) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.driver = MpvDriver::new(options.clone());
        Self::connect(&mut state).await?;
        Ok(())
    }

    async fn play_url(&self, url: &str, paused: bool) -> anyhow::Result<()> {
        self.handle().await?.open(url, paused).await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.handle().await?.set_pause(true).await
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.handle().await?.set_pause(false).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.handle().await?.stop().await
    }

    async fn release(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.handle.take() {
            if let Err(e) = handle.quit().await {
                debug!("mpv: quit failed, killing: {}", e);
            }
        }
        state.driver.kill().await;
        info!("mpv: released");
        Ok(())
    }
}
