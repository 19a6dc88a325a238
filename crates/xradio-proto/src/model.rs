use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Player status as seen by the orchestrator.
///
/// A new session starts in `Playing`: the first track loaded is expected to
/// be audible. `Paused` survives track changes, `Stopped` is only held for
/// the short moment between two tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
            PlayerStatus::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

// ── signals ───────────────────────────────────────────────────────────────────

/// Logical user actions delivered by the hotkey router.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    TogglePause,
    Next,
    Download,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::TogglePause, Signal::Next, Signal::Download];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::TogglePause => "toggle-pause",
            Signal::Next => "next",
            Signal::Download => "download",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal \"{0}\"")]
pub struct UnknownSignal(pub String);

impl FromStr for Signal {
    type Err = UnknownSignal;

    /// Accepts both the bare names and the `sig-` prefixed form used in
    /// hotkey files.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let bare = name.strip_prefix("sig-").unwrap_or(name);
        match bare {
            "toggle-pause" | "pause" => Ok(Signal::TogglePause),
            "next" | "skip" => Ok(Signal::Next),
            "download" => Ok(Signal::Download),
            _ => Err(UnknownSignal(name.to_string())),
        }
    }
}

// ── tracks and channels ───────────────────────────────────────────────────────

/// One playable item of a chunk. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_date: String,
    /// Already normalized by the station adapter.
    pub url: String,
    pub duration: Duration,
}

impl Track {
    /// `Artist - Title [Album] - m:ss`, album omitted when unknown.
    pub fn display_title(&self) -> String {
        let length = format_time(self.duration.as_secs());
        if self.album.is_empty() {
            format!("{} - {} - {}", self.artist, self.title, length)
        } else {
            format!("{} - {} [{}] - {}", self.artist, self.title, self.album, length)
        }
    }

    /// Base name for a downloaded copy of this track.
    pub fn file_stem(&self) -> String {
        safe_filename(&format!("{} - {}", self.artist, self.title))
    }
}

/// A channel together with the chunk of tracks currently scheduled on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Channel {
    pub id: u64,
    pub title: String,
    pub expires_on: Option<String>,
    /// Sum of the track durations; bounds the access token validity.
    pub length: Duration,
    pub tracks: Vec<Track>,
}

impl Channel {
    pub fn new(id: u64, expires_on: Option<String>, tracks: Vec<Track>) -> Self {
        let length = tracks
            .iter()
            .fold(Duration::ZERO, |sum, t| sum.saturating_add(t.duration));
        Self {
            id,
            title: String::new(),
            expires_on,
            length,
            tracks,
        }
    }

    /// Human readable chunk listing, one track per line.
    pub fn listing(&self) -> String {
        self.tracks
            .iter()
            .map(|t| format!(" * {}", t.display_title()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Seconds as `m:ss`.
pub fn format_time(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Make a title safe to use as a file name.
pub fn safe_filename(title: &str) -> String {
    title
        .replace(['/', '\\', ':'], "-")
        .trim()
        .trim_matches('.')
        .to_string()
}
