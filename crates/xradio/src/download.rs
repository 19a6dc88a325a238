//! Saving the current track to `<downloads>/<station>/<channel>/Artist - Title.mp3`.
//!
//! Downloads never run concurrently. A file that already exists is left
//! alone and reported, which is not an error.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xradio_proto::model::Track;
use xradio_proto::platform;

use crate::station::DownloadMethod;
use crate::tags::{TagWriter, TrackTags};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    /// Nothing was written; the path is the file that was already there.
    AlreadyExists(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("couldn't create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transfer failed: {0:#}")]
    Transfer(anyhow::Error),
    #[error("tagging failed: {0:#}")]
    Tagging(anyhow::Error),
}

/// Puts the audio behind `url` into `dest`.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()>;
}

/// Re-encodes the stream with `ffmpeg -i <url> <dest>`.
pub struct Ffmpeg {
    binary: Option<PathBuf>,
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self {
            binary: platform::find_ffmpeg_binary(),
        }
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg binary not found"))?;
        debug!("ffmpeg -i {} {}", url, dest.display());
        let output = Command::new(binary)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-n")
            .arg("-i")
            .arg(url)
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to spawn ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            for line in stderr.lines() {
                warn!("ffmpeg: {}", line);
            }
            anyhow::bail!("ffmpeg exited with status: {:?}", output.status.code());
        }
        Ok(())
    }
}

/// Streams the file as is; for stations that already serve mp3.
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transcoder for HttpFetch {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

pub fn transcoder_for(method: DownloadMethod, client: Client) -> Arc<dyn Transcoder> {
    match method {
        DownloadMethod::Transcode => Arc::new(Ffmpeg::new()),
        DownloadMethod::Direct => Arc::new(HttpFetch::new(client)),
    }
}

// ── guard ─────────────────────────────────────────────────────────────────────

pub struct DownloadGuard {
    lock: Mutex<()>,
    transcoder: Arc<dyn Transcoder>,
    tagger: Arc<dyn TagWriter>,
}

impl DownloadGuard {
    pub fn new(transcoder: Arc<dyn Transcoder>, tagger: Arc<dyn TagWriter>) -> Self {
        Self {
            lock: Mutex::new(()),
            transcoder,
            tagger,
        }
    }

    pub async fn download(
        &self,
        track: &Track,
        channel_title: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| DownloadError::CreateDir {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        let dest = dest_dir.join(format!("{}.mp3", track.file_stem()));
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            info!("Track already downloaded: {}", dest.display());
            return Ok(DownloadOutcome::AlreadyExists(dest));
        }

        info!("Downloading {} to {}", track.display_title(), dest.display());
        if let Err(e) = self.transcoder.fetch(&track.url, &dest).await {
            // A partial file would look like a finished download next time.
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(DownloadError::Transfer(e));
        }

        let tags = TrackTags::for_track(track, channel_title);
        self.tagger
            .write(&dest, &tags)
            .await
            .map_err(DownloadError::Tagging)?;

        info!("Download complete: {}", dest.display());
        Ok(DownloadOutcome::Downloaded(dest))
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{FakeTagger, FakeTranscoder};
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn track(artist: &str, title: &str) -> Track {
        Track {
            id: 1,
            title: title.to_string(),
            artist: artist.to_string(),
            url: format!("https://cdn.example/{}.mp4", title),
            duration: Duration::from_secs(200),
            ..Track::default()
        }
    }

    fn guard(transcoder: Arc<FakeTranscoder>, tagger: Arc<FakeTagger>) -> DownloadGuard {
        DownloadGuard::new(transcoder, tagger)
    }

    #[tokio::test]
    async fn test_download_writes_and_tags() {
        let dir = TempDir::new().unwrap();
        let dest_dir = dir.path().join("rockradio").join("Classic Rock");
        let transcoder = Arc::new(FakeTranscoder::default());
        let tagger = Arc::new(FakeTagger::default());

        let outcome = guard(transcoder.clone(), tagger.clone())
            .download(&track("Deep Purple", "Highway Star"), "Classic Rock", &dest_dir)
            .await
            .unwrap();

        let expected = dest_dir.join("Deep Purple - Highway Star.mp3");
        assert_eq!(outcome, DownloadOutcome::Downloaded(expected.clone()));
        assert!(expected.exists());
        let written = tagger.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1.album, "Classic Rock");
    }

    #[tokio::test]
    async fn test_existing_file_skips_transcoder() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("Deep Purple - Highway Star.mp3");
        std::fs::write(&existing, b"old").unwrap();
        let transcoder = Arc::new(FakeTranscoder::default());
        let tagger = Arc::new(FakeTagger::default());

        let outcome = guard(transcoder.clone(), tagger.clone())
            .download(&track("Deep Purple", "Highway Star"), "Classic Rock", dir.path())
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::AlreadyExists(existing.clone()));
        assert_eq!(transcoder.calls(), 0);
        assert!(tagger.written.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_failed_transfer_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder {
            fail: true,
            ..FakeTranscoder::default()
        });
        let tagger = Arc::new(FakeTagger::default());

        let result = guard(transcoder, tagger.clone())
            .download(&track("Rainbow", "Stargazer"), "Classic Rock", dir.path())
            .await;

        assert!(matches!(result, Err(DownloadError::Transfer(_))));
        assert!(!dir.path().join("Rainbow - Stargazer.mp3").exists());
        assert!(tagger.written.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_downloads_are_serialized() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder {
            delay: Duration::from_secs(3),
            ..FakeTranscoder::default()
        });
        let guard = Arc::new(guard(transcoder.clone(), Arc::new(FakeTagger::default())));

        let tasks: Vec<_> = ["One", "Two", "Three"]
            .into_iter()
            .map(|title| {
                let guard = guard.clone();
                let dest = dir.path().to_path_buf();
                tokio::spawn(async move {
                    guard
                        .download(&track("Band", title), "Channel", &dest)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(transcoder.calls(), 3);
        assert_eq!(transcoder.max_active(), 1);
    }
}
