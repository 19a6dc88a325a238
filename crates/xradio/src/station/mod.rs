//! Station adapters.
//!
//! Every supported network sits behind [`StationAdapter`]: it hands out an
//! access token, the channel catalog and chunks of upcoming tracks with
//! stream URLs already normalized. The orchestrator never looks at the
//! remote formats.

mod audioaddict;
mod onair101;

pub use audioaddict::AudioAddict;
pub use onair101::OnAir101;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use xradio_proto::catalog::Catalog;
use xradio_proto::model::Channel;

const USER_AGENT: &str = concat!("xradio/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("bad pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("{0} not found in page")]
    Pattern(&'static str),
    #[error("station returned an empty access token")]
    InvalidToken,
    #[error("channel {0} returned no tracks")]
    EmptyChunk(u64),
}

/// How a track of this station is saved to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMethod {
    /// Re-encode the stream through ffmpeg.
    Transcode,
    /// The URL already points at an mp3 file; copy it over HTTP.
    Direct,
}

#[async_trait]
pub trait StationAdapter: Send + Sync {
    /// Station key, used for cache and download paths.
    fn key(&self) -> &str;

    async fn fetch_token(&self) -> Result<String, FetchError>;

    async fn fetch_channel_list(&self) -> Result<Catalog, FetchError>;

    /// Next chunk of tracks for `channel_id`. The returned channel has no
    /// title; the caller fills it in from the catalog.
    async fn fetch_chunk(&self, channel_id: u64, token: &str) -> Result<Channel, FetchError>;

    fn normalize_url(&self, url: &str) -> String;

    fn download_method(&self) -> DownloadMethod {
        DownloadMethod::Transcode
    }

    /// Live stations report what is on air right now: a chunk may repeat the
    /// track that is still playing, and the track keeps playing past its
    /// reported end.
    fn is_live(&self) -> bool {
        false
    }
}

// ── station registry ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    AudioAddict,
    OnAir101,
}

/// A station reachable through one of the command line aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub alias: &'static str,
    pub key: &'static str,
    pub title: &'static str,
    pub origin: &'static str,
    pub network: Network,
}

const AUDIOADDICT_API: &str = "https://api.audioaddict.com/v1";

const fn aa(alias: &'static str, key: &'static str, title: &'static str, origin: &'static str) -> Station {
    Station {
        alias,
        key,
        title,
        origin,
        network: Network::AudioAddict,
    }
}

pub const STATIONS: &[Station] = &[
    aa("rock", "rockradio", "ROCKRADIO.com", "https://www.rockradio.com"),
    aa("rockradio", "rockradio", "ROCKRADIO.com", "https://www.rockradio.com"),
    aa("rockradio.com", "rockradio", "ROCKRADIO.com", "https://www.rockradio.com"),
    aa("jazz", "jazzradio", "JAZZRADIO.com", "https://www.jazzradio.com"),
    aa("jazzradio", "jazzradio", "JAZZRADIO.com", "https://www.jazzradio.com"),
    aa("jazzradio.com", "jazzradio", "JAZZRADIO.com", "https://www.jazzradio.com"),
    aa("classic", "classicradio", "ClassicalRadio.com", "https://www.classicalradio.com"),
    aa("classicradio", "classicradio", "ClassicalRadio.com", "https://www.classicalradio.com"),
    aa("classicradio.com", "classicradio", "ClassicalRadio.com", "https://www.classicalradio.com"),
    aa("tunes", "radiotunes", "RadioTunes", "https://www.radiotunes.com"),
    aa("radiotunes", "radiotunes", "RadioTunes", "https://www.radiotunes.com"),
    aa("radiotunes.com", "radiotunes", "RadioTunes", "https://www.radiotunes.com"),
    aa("zen", "zenradio", "ZenRadio.com", "https://www.zenradio.com"),
    aa("zenradio", "zenradio", "ZenRadio.com", "https://www.zenradio.com"),
    aa("zenradio.com", "zenradio", "ZenRadio.com", "https://www.zenradio.com"),
    Station {
        alias: "101",
        key: "101ru",
        title: "101.ru",
        origin: "http://101.ru",
        network: Network::OnAir101,
    },
    Station {
        alias: "101.ru",
        key: "101ru",
        title: "101.ru",
        origin: "http://101.ru",
        network: Network::OnAir101,
    },
];

pub fn lookup(alias: &str) -> Option<&'static Station> {
    let alias = alias.trim().to_lowercase();
    STATIONS.iter().find(|s| s.alias == alias)
}

/// One entry per station key, in registry order.
pub fn unique_stations() -> Vec<&'static Station> {
    let mut seen: Vec<&'static Station> = Vec::new();
    for station in STATIONS {
        if !seen.iter().any(|s| s.key == station.key) {
            seen.push(station);
        }
    }
    seen
}

/// `key: alias, alias, ...` lines for `xradio stations`.
pub fn listing() -> String {
    unique_stations()
        .into_iter()
        .map(|station| {
            let aliases: Vec<&str> = STATIONS
                .iter()
                .filter(|s| s.key == station.key)
                .map(|s| s.alias)
                .collect();
            format!("{:<14} {}", station.title, aliases.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_adapter(station: &Station) -> Result<Arc<dyn StationAdapter>, FetchError> {
    let client = http_client()?;
    Ok(match station.network {
        Network::AudioAddict => Arc::new(AudioAddict::new(*station, AUDIOADDICT_API, client)),
        Network::OnAir101 => Arc::new(OnAir101::new(*station, client)),
    })
}

// ── shared helpers ────────────────────────────────────────────────────────────

pub(crate) fn http_client() -> Result<Client, FetchError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()?)
}

pub(crate) async fn get_text(client: &Client, url: &str) -> Result<String, FetchError> {
    tracing::debug!("GET {}", url);
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(FetchError::Status(resp.status()));
    }
    Ok(resp.text().await?)
}

/// Turn a stream URL as found in station payloads into an absolute one.
///
/// Scheme-relative URLs (`//host/...`) take the scheme of `origin`, bare
/// paths are joined to it. When `duplicated` occurs exactly twice the first
/// occurrence is dropped, which repairs URLs where the station concatenated
/// the same storage prefix twice.
pub fn normalize_url(url: &str, origin: &str, duplicated: Option<&str>) -> String {
    let url = url.trim();
    let mut absolute = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("//") {
        let scheme = origin.split("://").next().unwrap_or("https");
        format!("{}://{}", scheme, rest)
    } else if url.starts_with('/') {
        format!("{}{}", origin.trim_end_matches('/'), url)
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), url)
    };

    if let Some(fragment) = duplicated.filter(|f| !f.is_empty()) {
        if absolute.matches(fragment).count() == 2 {
            absolute = absolute.replacen(fragment, "", 1);
        }
    }
    absolute
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted adapter for orchestrator tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use xradio_proto::catalog::CatalogEntry;
    use xradio_proto::model::Track;

    pub struct MockStation {
        pub token_delay: Duration,
        token_calls: AtomicUsize,
        chunk_calls: AtomicUsize,
        chunk_failures: AtomicUsize,
        chunks: Mutex<VecDeque<Channel>>,
        fallback: Channel,
        log: Mutex<Vec<String>>,
        method: DownloadMethod,
        live: bool,
    }

    pub fn track(id: u64, secs: u64) -> Track {
        Track {
            id,
            title: format!("Title {}", id),
            artist: format!("Artist {}", id),
            url: format!("https://cdn.example/{}.mp4", id),
            duration: Duration::from_secs(secs),
            ..Track::default()
        }
    }

    impl MockStation {
        /// Serves `fallback` whenever no scripted chunk is queued.
        pub fn new(fallback: Channel) -> Self {
            Self {
                token_delay: Duration::ZERO,
                token_calls: AtomicUsize::new(0),
                chunk_calls: AtomicUsize::new(0),
                chunk_failures: AtomicUsize::new(0),
                chunks: Mutex::new(VecDeque::new()),
                fallback,
                log: Mutex::new(Vec::new()),
                method: DownloadMethod::Transcode,
                live: false,
            }
        }

        /// Behave like an on-air station.
        pub fn live(mut self) -> Self {
            self.live = true;
            self
        }

        pub fn with_token_delay(mut self, delay: Duration) -> Self {
            self.token_delay = delay;
            self
        }

        pub fn push_chunk(&self, chunk: Channel) {
            self.chunks.lock().unwrap().push_back(chunk);
        }

        /// Make the next `n` chunk fetches fail.
        pub fn fail_chunks(&self, n: usize) {
            self.chunk_failures.store(n, Ordering::SeqCst);
        }

        pub fn token_calls(&self) -> usize {
            self.token_calls.load(Ordering::SeqCst)
        }

        pub fn chunk_calls(&self) -> usize {
            self.chunk_calls.load(Ordering::SeqCst)
        }

        /// Call log: `token <value>` and `chunk <token>` entries in order.
        pub fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StationAdapter for MockStation {
        fn key(&self) -> &str {
            "mock"
        }

        async fn fetch_token(&self) -> Result<String, FetchError> {
            let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.token_delay.is_zero() {
                tokio::time::sleep(self.token_delay).await;
            }
            let token = format!("token-{}", n);
            self.log.lock().unwrap().push(format!("token {}", token));
            Ok(token)
        }

        async fn fetch_channel_list(&self) -> Result<Catalog, FetchError> {
            Ok([CatalogEntry {
                id: self.fallback.id,
                title: "Mock Channel".to_string(),
                group: None,
            }]
            .into_iter()
            .collect())
        }

        async fn fetch_chunk(&self, channel_id: u64, token: &str) -> Result<Channel, FetchError> {
            self.chunk_calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("chunk {}", token));
            let failing = self
                .chunk_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
            let chunk = self
                .chunks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Ok(Channel {
                id: channel_id,
                ..chunk
            })
        }

        fn normalize_url(&self, url: &str) -> String {
            url.to_string()
        }

        fn download_method(&self) -> DownloadMethod {
            self.method
        }

        fn is_live(&self) -> bool {
            self.live
        }
    }
}
