//! Audio tags for downloaded tracks, written with lofty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};
use std::path::Path;
use xradio_proto::model::Track;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<String>,
}

impl TrackTags {
    /// Tags for `track`; the channel title stands in for an unknown album.
    pub fn for_track(track: &Track, channel_title: &str) -> Self {
        let album = if track.album.trim().is_empty() {
            channel_title.to_string()
        } else {
            track.album.clone()
        };
        let year = track
            .album_date
            .get(..4)
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album,
            year,
        }
    }
}

#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

pub struct LoftyTagger;

#[async_trait]
impl TagWriter for LoftyTagger {
    async fn write(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        let path = path.to_path_buf();
        let tags = tags.clone();
        tokio::task::spawn_blocking(move || write_tags_blocking(&path, &tags))
            .await
            .context("Tag writing task failed")??;
        Ok(())
    }
}

fn write_tags_blocking(path: &Path, tags: &TrackTags) -> Result<()> {
    let tagged_file = Probe::open(path)?
        .read()
        .context("Failed to read audio file")?;

    let tag_type = guess_tag_type(path)?;
    let mut tag = tagged_file
        .tag(tag_type)
        .cloned()
        .unwrap_or_else(|| Tag::new(tag_type));

    tag.insert_text(ItemKey::TrackTitle, tags.title.clone());
    tag.insert_text(ItemKey::TrackArtist, tags.artist.clone());
    tag.insert_text(ItemKey::AlbumTitle, tags.album.clone());
    if let Some(year) = &tags.year {
        tag.insert_text(ItemKey::Year, year.clone());
    }

    tag.save_to_path(path, WriteOptions::default())
        .context("Failed to save tags to file")?;
    Ok(())
}

fn guess_tag_type(path: &Path) -> Result<TagType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "mp3" => Ok(TagType::Id3v2),
        "m4a" | "mp4" | "aac" => Ok(TagType::Mp4Ilst),
        "ogg" | "opus" | "flac" => Ok(TagType::VorbisComments),
        _ => anyhow::bail!("Unsupported audio format: {}", ext),
    }
}
