//! AudioAddict network (rockradio, jazzradio, classicalradio, radiotunes, zenradio).
//!
//! The station home page embeds both the audio token and the channel list in
//! its inline bootstrap script. Chunks come from the public routines API.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use xradio_proto::catalog::{Catalog, CatalogEntry};
use xradio_proto::model::{Channel, Track};

use super::{get_text, normalize_url, FetchError, Station, StationAdapter};

pub struct AudioAddict {
    station: Station,
    api: String,
    client: Client,
}

impl AudioAddict {
    pub fn new(station: Station, api: &str, client: Client) -> Self {
        Self {
            station,
            api: api.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn fetch_currently_playing(&self, page: &str) -> Result<Catalog, FetchError> {
        let url = format!("{}/_papi/v1/{}/currently_playing", self.station.origin, self.station.key);
        let body = get_text(&self.client, &url).await?;
        parse_currently_playing(&body, page)
    }
}

#[async_trait]
impl StationAdapter for AudioAddict {
    fn key(&self) -> &str {
        self.station.key
    }

    async fn fetch_token(&self) -> Result<String, FetchError> {
        let page = get_text(&self.client, self.station.origin).await?;
        parse_audio_token(&page)
    }

    async fn fetch_channel_list(&self) -> Result<Catalog, FetchError> {
        let page = get_text(&self.client, self.station.origin).await?;
        match parse_app_channels(&page)? {
            Some(catalog) if !catalog.is_empty() => Ok(catalog),
            _ => {
                warn!("No channel list in {} bootstrap, asking currently_playing", self.station.origin);
                self.fetch_currently_playing(&page).await
            }
        }
    }

    async fn fetch_chunk(&self, channel_id: u64, token: &str) -> Result<Channel, FetchError> {
        if token.is_empty() {
            return Err(FetchError::InvalidToken);
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let url = format!(
            "{}/{}/routines/channel/{}?audio_token={}&_={}",
            self.api, self.station.key, channel_id, token, millis
        );
        let body = get_text(&self.client, &url).await?;
        let channel = parse_chunk(&body, |u| self.normalize_url(u))?;
        if channel.tracks.is_empty() {
            return Err(FetchError::EmptyChunk(channel_id));
        }
        debug!(
            "Chunk for channel {}: {} tracks, expires {}",
            channel_id,
            channel.tracks.len(),
            channel.expires_on.as_deref().unwrap_or("-")
        );
        Ok(channel)
    }

    fn normalize_url(&self, url: &str) -> String {
        normalize_url(url, self.station.origin, None)
    }
}

// ── page parsing ──────────────────────────────────────────────────────────────

pub(crate) fn parse_audio_token(page: &str) -> Result<String, FetchError> {
    let re = Regex::new(r#""audio_token":"([a-z0-9]+)""#)?;
    let token = re
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(FetchError::Pattern("audio token"))?;
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct AppStart {
    #[serde(default)]
    channels: Vec<AppChannel>,
}

#[derive(Debug, Deserialize)]
struct AppChannel {
    id: u64,
    name: String,
}

/// Channel list from the `di.app.start(...)` bootstrap call. `None` when the
/// page has no such call.
pub(crate) fn parse_app_channels(page: &str) -> Result<Option<Catalog>, FetchError> {
    let re = Regex::new(r"di\.app\.start\((?:\);)?(.*)\);")?;
    let Some(raw) = re.captures(page).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let start: AppStart = serde_json::from_str(raw.as_str())?;
    Ok(Some(
        start
            .channels
            .into_iter()
            .map(|c| CatalogEntry {
                id: c.id,
                title: c.name,
                group: None,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    channel_id: u64,
    channel_key: String,
}

/// Fallback catalog: ids from `currently_playing`, names looked up in the
/// page by channel key. Channels whose name can't be found keep their key.
pub(crate) fn parse_currently_playing(body: &str, page: &str) -> Result<Catalog, FetchError> {
    let playing: Vec<CurrentlyPlaying> = serde_json::from_str(body)?;
    let re = Regex::new(r#""key":"([^"]+)","name":"([^"]+)""#)?;
    let names: HashMap<&str, &str> = re
        .captures_iter(page)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    Ok(playing
        .into_iter()
        .map(|p| CatalogEntry {
            id: p.channel_id,
            title: names
                .get(p.channel_key.as_str())
                .map(|n| n.to_string())
                .unwrap_or(p.channel_key),
            group: None,
        })
        .collect())
}

// ── routines API ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Routine {
    channel_id: u64,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default)]
    tracks: Vec<RoutineTrack>,
}

#[derive(Debug, Deserialize)]
struct RoutineTrack {
    id: u64,
    #[serde(default)]
    display_artist: Option<String>,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    length: f64,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    url: String,
}

pub(crate) fn parse_chunk<F>(body: &str, normalize: F) -> Result<Channel, FetchError>
where
    F: Fn(&str) -> String,
{
    let routine: Routine = serde_json::from_str(body)?;
    let tracks = routine
        .tracks
        .into_iter()
        .filter_map(|t| {
            // Tracks without a playable asset are skipped.
            let asset = t.content.assets.first()?;
            let duration = match Duration::try_from_secs_f64(t.content.length.max(0.0)) {
                Ok(duration) => duration,
                Err(e) => {
                    warn!("Track {} skipped, bad length {}: {}", t.id, t.content.length, e);
                    return None;
                }
            };
            Some(Track {
                id: t.id,
                title: t.display_title.unwrap_or_default(),
                artist: t.display_artist.unwrap_or_default(),
                album: t.release.unwrap_or_default(),
                album_date: t.release_date.unwrap_or_default(),
                url: normalize(&asset.url),
                duration,
            })
        })
        .collect();
    Ok(Channel::new(routine.channel_id, routine.expires_on, tracks))
}
