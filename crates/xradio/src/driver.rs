use async_trait::async_trait;

/// Settings the playback engine is started with.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// 0.0 - 1.0
    pub volume: f32,
    pub extra_args: Vec<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            volume: 0.8,
            extra_args: Vec::new(),
        }
    }
}

/// The audio engine. Implementations take a URL and make noise; status
/// bookkeeping stays with the caller.
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    async fn init(&self, options: &DriverOptions) -> anyhow::Result<()>;
    /// Load `url`. With `paused` set the track is loaded without starting
    /// playback.
    async fn play_url(&self, url: &str, paused: bool) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn resume(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn release(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every call as a short string: `play <url>`, `pause`, ...
    /// A track loaded paused is recorded as `play <url> paused`.
    #[derive(Default)]
    pub struct RecordingDriver {
        calls: Mutex<Vec<String>>,
        failing_plays: AtomicU32,
        latency: Duration,
    }

    impl RecordingDriver {
        /// Pause and resume take `latency` to answer, like an IPC round trip.
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        /// The next `n` loads are recorded and then fail.
        pub fn fail_plays(&self, n: u32) {
            self.failing_plays.store(n, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn plays(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("play "))
                .collect()
        }

        async fn answer(&self) {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl PlaybackDriver for RecordingDriver {
        async fn init(&self, _options: &DriverOptions) -> anyhow::Result<()> {
            self.record("init".to_string());
            Ok(())
        }

        async fn play_url(&self, url: &str, paused: bool) -> anyhow::Result<()> {
            if paused {
                self.record(format!("play {} paused", url));
            } else {
                self.record(format!("play {}", url));
            }
            let failing = self
                .failing_plays
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                anyhow::bail!("cannot open {}", url);
            }
            Ok(())
        }

        async fn pause(&self) -> anyhow::Result<()> {
            self.answer().await;
            self.record("pause".to_string());
            Ok(())
        }

        async fn resume(&self) -> anyhow::Result<()> {
            self.answer().await;
            self.record("resume".to_string());
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.record("stop".to_string());
            Ok(())
        }

        async fn release(&self) -> anyhow::Result<()> {
            self.record("release".to_string());
            Ok(())
        }
    }
}
