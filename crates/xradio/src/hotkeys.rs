//! Hotkey bindings file and the signal router.
//!
//! The OS-level key grabber lives outside this process. Raw key names arrive
//! as [`RawInput`] (today through the HTTP bridge), stamped with their arrival
//! time, get resolved against the bindings and are forwarded to
//! [`PlayerHandle::catch`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use xradio_proto::model::{Signal, UnknownSignal};

use crate::core::PlayerHandle;
use crate::error::SignalError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hotkey {
    pub key: String,
    /// `sig-toggle-pause`, `sig-next` or `sig-download`.
    pub signal: String,
}

impl Hotkey {
    fn new(key: &str, signal: Signal) -> Self {
        Self {
            key: key.to_string(),
            signal: format!("sig-{}", signal),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bindings {
    pub hotkeys: Vec<Hotkey>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            hotkeys: vec![
                Hotkey::new("Pause", Signal::TogglePause),
                Hotkey::new("Control-Shift-k", Signal::TogglePause),
                Hotkey::new("Control-Shift-l", Signal::Next),
                Hotkey::new("Control-Shift-d", Signal::Download),
            ],
        }
    }
}

impl Bindings {
    /// Read the bindings file, writing the default set when there is none.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let bindings = Self::default();
            bindings.save(path)?;
            info!("Default hotkeys written to {}", path.display());
            return Ok(bindings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hotkeys from {}", path.display()))?;
        let bindings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse hotkeys in {}", path.display()))?;
        for hotkey in &bindings.hotkeys {
            if let Err(e) = hotkey.signal.parse::<Signal>() {
                warn!("Hotkey {} ignored: {}", hotkey.key, e);
            }
        }
        debug!("{} hotkeys loaded", bindings.hotkeys.len());
        Ok(bindings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write hotkeys to {}", path.display()))?;
        Ok(())
    }

    /// Signal bound to `key`, or `None` when the key is not bound at all.
    /// Key names compare case-insensitively.
    pub fn resolve(&self, key: &str) -> Option<Result<Signal, UnknownSignal>> {
        let key = key.trim();
        self.hotkeys
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.signal.parse())
    }
}

// ── router ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    /// A key name as reported by the grabber, resolved through the bindings.
    Key(String),
    /// A signal that bypasses the bindings.
    Signal(Signal),
}

/// A [`RawInput`] with the time it reached the process. Debouncing compares
/// these times, not the time the router gets to the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub input: RawInput,
    pub arrived: Instant,
}

impl Received {
    pub fn now(input: RawInput) -> Self {
        Self {
            input,
            arrived: Instant::now(),
        }
    }
}

pub struct SignalRouter {
    bindings: Arc<Bindings>,
    player: PlayerHandle,
    rx: mpsc::Receiver<Received>,
}

impl SignalRouter {
    pub fn new(bindings: Arc<Bindings>, player: PlayerHandle) -> (Self, mpsc::Sender<Received>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Self {
                bindings,
                player,
                rx,
            },
            tx,
        )
    }

    /// Forward inputs until every sender is gone.
    pub async fn run(mut self) {
        while let Some(Received { input, arrived }) = self.rx.recv().await {
            let signal = match self.signal_for(&input) {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    debug!("{:?} is not bound", input);
                    continue;
                }
                Err(e) => {
                    warn!("{:?} has a bad binding: {}", input, e);
                    continue;
                }
            };
            if let Err(e) = self.player.catch(signal, arrived).await {
                debug!("Signal {} dropped: {}", signal, e);
            }
        }
        debug!("Signal router stopped");
    }

    fn signal_for(&self, input: &RawInput) -> Result<Option<Signal>, SignalError> {
        match input {
            RawInput::Signal(signal) => Ok(Some(*signal)),
            RawInput::Key(key) => match self.bindings.resolve(key) {
                Some(bound) => Ok(Some(bound?)),
                None => Ok(None),
            },
        }
    }
}

/// Tasks that hold the hotkey plumbing; released on shutdown.
pub struct HotkeyService {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl HotkeyService {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn attach(&mut self, name: &'static str, task: JoinHandle<()>) {
        self.tasks.push((name, task));
    }

    /// Stop every task. Fails when one of them had already died abnormally.
    pub async fn release(self) -> Result<()> {
        let mut failed = Vec::new();
        for (name, task) in self.tasks {
            task.abort();
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    warn!("Hotkey task {} failed: {}", name, e);
                    failed.push(name);
                }
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("Failed to release hotkeys: {}", failed.join(", "));
        }
        debug!("Hotkeys released");
        Ok(())
    }
}

impl Default for HotkeyService {
    fn default() -> Self {
        Self::new()
    }
}
