//! 101.ru. No access token, one track per chunk: the "chunk" is whatever is
//! on air right now and its duration is the time left until the song ends.

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use xradio_proto::catalog::{Catalog, CatalogEntry};
use xradio_proto::model::{Channel, Track};

use super::{get_text, normalize_url, DownloadMethod, FetchError, Station, StationAdapter};

/// 101.ru serves without authentication; this stands in for the token so
/// the retrieval path stays identical for every station.
const PLACEHOLDER_TOKEN: &str = "public";
/// Storage prefix the API sometimes repeats inside file URLs.
const DUPLICATED_FRAGMENT: &str = "/vardata/modules/musicdb/files/";

/// Fallback wait when the reported remaining time is implausible.
const MIN_ON_AIR: u64 = 5;
const MAX_ON_AIR: u64 = 1800;
/// Fetch slightly before the song ends.
const EARLY_FETCH: u64 = 3;

pub struct OnAir101 {
    station: Station,
    client: Client,
}

impl OnAir101 {
    pub fn new(station: Station, client: Client) -> Self {
        Self { station, client }
    }

    async fn fetch_group(&self, group: &Group) -> Vec<CatalogEntry> {
        let url = format!("{}/radio-top/group/{}", self.station.origin, group.id);
        let page = match get_text(&self.client, &url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping channel group {}: {}", group.title, e);
                return Vec::new();
            }
        };
        match parse_group_page(&page) {
            Ok(channels) => channels
                .into_iter()
                .map(|(id, title)| CatalogEntry {
                    id,
                    title,
                    group: Some(group.title.clone()),
                })
                .collect(),
            Err(e) => {
                warn!("Skipping channel group {}: {}", group.title, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl StationAdapter for OnAir101 {
    fn key(&self) -> &str {
        self.station.key
    }

    async fn fetch_token(&self) -> Result<String, FetchError> {
        Ok(PLACEHOLDER_TOKEN.to_string())
    }

    async fn fetch_channel_list(&self) -> Result<Catalog, FetchError> {
        let url = format!("{}/radio-top", self.station.origin);
        let page = get_text(&self.client, &url).await?;
        let groups = parse_groups_page(&page)?;
        debug!("Found {} channel groups", groups.len());

        let catalog: Catalog = join_all(groups.iter().map(|g| self.fetch_group(g)))
            .await
            .into_iter()
            .flatten()
            .collect();
        if catalog.is_empty() {
            return Err(FetchError::Pattern("channel list"));
        }
        Ok(catalog)
    }

    async fn fetch_chunk(&self, channel_id: u64, _token: &str) -> Result<Channel, FetchError> {
        let url = format!(
            "{}/api/channel/getTrackOnAir/{}/channel/?dataFormat=json",
            self.station.origin, channel_id
        );
        let body = get_text(&self.client, &url).await?;
        parse_on_air(channel_id, &body, |u| self.normalize_url(u))
    }

    fn normalize_url(&self, url: &str) -> String {
        normalize_url(url, self.station.origin, Some(DUPLICATED_FRAGMENT))
    }

    fn download_method(&self) -> DownloadMethod {
        DownloadMethod::Direct
    }

    fn is_live(&self) -> bool {
        true
    }
}

// ── catalog scraping ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Group {
    id: u64,
    title: String,
}

fn selector(css: &'static str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|_| FetchError::Pattern(css))
}

/// Numeric id at the end of a link, `/radio-top/group/4` → 4.
fn id_from_href(href: &str) -> Option<u64> {
    href.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

fn parse_groups_page(page: &str) -> Result<Vec<Group>, FetchError> {
    let doc = Html::parse_document(page);
    let links = selector("ul.channel-groups li a")?;
    Ok(doc
        .select(&links)
        .filter_map(|a| {
            let title = a.text().collect::<String>().trim().to_string();
            let id = id_from_href(a.value().attr("href")?)?;
            (!title.is_empty()).then_some(Group { id, title })
        })
        .collect())
}

fn parse_group_page(page: &str) -> Result<Vec<(u64, String)>, FetchError> {
    let doc = Html::parse_document(page);
    let links = selector("div.grid a.grid__title")?;
    let span = selector("span")?;
    Ok(doc
        .select(&links)
        .filter_map(|a| {
            let id = id_from_href(a.value().attr("href")?)?;
            let title = a
                .select(&span)
                .flat_map(|s| s.text())
                .collect::<String>()
                .trim()
                .to_string();
            Some((id, title))
        })
        .collect())
}

// ── on-air API ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OnAir {
    result: OnAirResult,
}

#[derive(Debug, Deserialize)]
struct OnAirResult {
    about: About,
    stat: Stat,
}

#[derive(Debug, Deserialize)]
struct About {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "title_executor")]
    artist: String,
    #[serde(default)]
    audio: Vec<Audio>,
    #[serde(default)]
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Audio {
    trackuid: u64,
    filename: String,
}

#[derive(Debug, Default, Deserialize)]
struct Album {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "releaseDate")]
    release_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stat {
    #[serde(default)]
    finish_song: u64,
    #[serde(default)]
    server_time: u64,
}

/// Time to wait before asking for the next on-air track.
pub(crate) fn on_air_duration(finish_song: u64, server_time: u64) -> Duration {
    let left = finish_song.saturating_sub(server_time);
    let secs = if !(MIN_ON_AIR..=MAX_ON_AIR).contains(&left) {
        MIN_ON_AIR
    } else {
        left - EARLY_FETCH
    };
    Duration::from_secs(secs)
}

fn parse_on_air<F>(channel_id: u64, body: &str, normalize: F) -> Result<Channel, FetchError>
where
    F: Fn(&str) -> String,
{
    let on_air: OnAir = serde_json::from_str(body)?;
    let about = on_air.result.about;
    let audio = about
        .audio
        .first()
        .ok_or(FetchError::EmptyChunk(channel_id))?;
    let track = Track {
        id: audio.trackuid,
        title: about.title,
        artist: about.artist,
        album: about.album.title,
        album_date: about.album.release_date,
        url: normalize(&audio.filename),
        duration: on_air_duration(on_air.result.stat.finish_song, on_air.result.stat.server_time),
    };
    Ok(Channel::new(channel_id, None, vec![track]))
}
