//! Playback orchestration.
//!
//! A single [`Orchestrator`] task owns the cycle
//!
//! ```text
//!   retrieve chunk ──► play track ──► wait { track end | skip | token timer }
//!        ▲                                        │
//!        └──────────── advance (stop, keep status) ◄┘
//! ```
//!
//! Everything else (hotkey router, HTTP bridge, detached refresh and download
//! tasks) talks to the player through a cloneable [`PlayerHandle`]. Detached
//! tasks report back over a [`TaskReport`] channel instead of being dropped
//! silently.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, error, info, warn};
use xradio_proto::model::{format_time, Channel, PlayerStatus, Signal, Track};
use xradio_proto::platform;

use crate::download::{DownloadGuard, DownloadOutcome};
use crate::driver::PlaybackDriver;
use crate::error::{FatalError, SignalError};
use crate::retry::RetryPolicy;
use crate::station::{FetchError, StationAdapter};
use crate::token::TokenCell;

/// Minimum spacing between two accepted signals.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_micros(500);

// ── task reports ──────────────────────────────────────────────────────────────

/// Outcome of work that runs detached from the playback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    TokenRefreshed,
    TokenRefreshFailed(String),
    Downloaded(PathBuf),
    DownloadSkipped(PathBuf),
    DownloadFailed(String),
}

impl TaskReport {
    pub fn log(&self) {
        match self {
            TaskReport::TokenRefreshed => debug!("Audio token refreshed"),
            TaskReport::TokenRefreshFailed(e) => warn!("Audio token refresh failed: {}", e),
            TaskReport::Downloaded(path) => info!("Track saved to {}", path.display()),
            TaskReport::DownloadSkipped(path) => {
                info!("File {} already exists, download skipped", path.display())
            }
            TaskReport::DownloadFailed(e) => error!("Download failed: {}", e),
        }
    }
}

pub async fn run_reporter(mut rx: mpsc::Receiver<TaskReport>) {
    while let Some(report) = rx.recv().await {
        report.log();
    }
}

// ── shared player state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub channel_id: u64,
    pub channel_title: String,
    pub track: Track,
    /// 0-based position inside the current chunk.
    pub index: usize,
    pub chunk_len: usize,
}

struct Shared {
    driver: Arc<dyn PlaybackDriver>,
    status: Mutex<PlayerStatus>,
    current: RwLock<Option<NowPlaying>>,
    /// Arrival time of the last accepted signal. Held for the whole of
    /// `catch`, so signals are handled one at a time.
    signal_gate: Mutex<Option<Instant>>,
    /// Capacity 1: a skip that arrives while another is pending is merged.
    skip_tx: mpsc::Sender<()>,
    downloads: Arc<DownloadGuard>,
    download_root: PathBuf,
    station_key: String,
    reports: mpsc::Sender<TaskReport>,
}

impl Shared {
    /// Load `url` and bring the engine in line with the recorded status.
    async fn play(&self, url: &str) {
        let status = self.status.lock().await;
        let paused = *status == PlayerStatus::Paused;
        if paused {
            debug!("Loading new track paused, player is paused");
        }
        if let Err(e) = self.driver.play_url(url, paused).await {
            error!("Play failed due to error: {:#}", e);
            return;
        }
        if *status == PlayerStatus::Stopped {
            if let Err(e) = self.driver.stop().await {
                warn!("Couldn't apply status {} to new track: {:#}", *status, e);
            }
        }
    }
}

/// Cloneable entry point into a running player.
#[derive(Clone)]
pub struct PlayerHandle {
    shared: Arc<Shared>,
}

impl PlayerHandle {
    /// Handle one user signal that reached the process at `arrived`. Signals
    /// closer than [`DEBOUNCE_WINDOW`] to the previously accepted one are
    /// rejected with [`SignalError::Debounced`].
    pub async fn catch(&self, signal: Signal, arrived: Instant) -> Result<(), SignalError> {
        let mut last = self.shared.signal_gate.lock().await;
        if let Some(prev) = *last {
            if arrived.saturating_duration_since(prev) < DEBOUNCE_WINDOW {
                debug!("Signal {} ignored, too close to the previous one", signal);
                return Err(SignalError::Debounced);
            }
        }
        *last = Some(arrived);

        debug!("Caught signal: {}", signal);
        match signal {
            Signal::TogglePause => self.toggle_pause().await,
            Signal::Next => self.request_skip(),
            Signal::Download => self.start_download().await,
        }
        Ok(())
    }

    pub async fn status(&self) -> PlayerStatus {
        *self.shared.status.lock().await
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.shared.current.read().await.clone()
    }

    async fn toggle_pause(&self) {
        let mut status = self.shared.status.lock().await;
        match *status {
            PlayerStatus::Playing => match self.shared.driver.pause().await {
                Ok(()) => {
                    *status = PlayerStatus::Paused;
                    info!("Paused");
                }
                Err(e) => error!("Pause failed: {:#}", e),
            },
            PlayerStatus::Paused => match self.shared.driver.resume().await {
                Ok(()) => {
                    *status = PlayerStatus::Playing;
                    info!("Resumed");
                }
                Err(e) => error!("Resume failed: {:#}", e),
            },
            PlayerStatus::Stopped => debug!("Player is stopped, nothing to toggle"),
        }
    }

    fn request_skip(&self) {
        match self.shared.skip_tx.try_send(()) {
            Ok(()) => debug!("Skip requested"),
            Err(mpsc::error::TrySendError::Full(())) => debug!("Skip already pending"),
            Err(mpsc::error::TrySendError::Closed(())) => warn!("Player loop is gone, skip dropped"),
        }
    }

    async fn start_download(&self) {
        let Some(now) = self.now_playing().await else {
            warn!("Nothing is playing, nothing to download");
            return;
        };
        let shared = self.shared.clone();
        let dest_dir = platform::channel_download_dir(
            &shared.download_root,
            &shared.station_key,
            &now.channel_title,
        );
        tokio::spawn(async move {
            let report = match shared
                .downloads
                .download(&now.track, &now.channel_title, &dest_dir)
                .await
            {
                Ok(DownloadOutcome::Downloaded(path)) => TaskReport::Downloaded(path),
                Ok(DownloadOutcome::AlreadyExists(path)) => TaskReport::DownloadSkipped(path),
                Err(e) => TaskReport::DownloadFailed(e.to_string()),
            };
            let _ = shared.reports.send(report).await;
        });
    }
}

// ── orchestrator ──────────────────────────────────────────────────────────────

/// What the user picked and how retrieval behaves.
#[derive(Debug, Clone)]
pub struct Session {
    pub channel_id: u64,
    pub channel_title: String,
    /// The token is refreshed this long before the chunk window ends.
    pub token_margin: Duration,
    pub retry: RetryPolicy,
    pub download_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Finished,
    Skipped,
}

/// Wait on the proactive refresh timer; never completes once it is disarmed.
async fn token_deadline(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    adapter: Arc<dyn StationAdapter>,
    token: Arc<TokenCell>,
    session: Session,
    skip_rx: mpsc::Receiver<()>,
    play_task: Option<JoinHandle<()>>,
    refresh_task: Option<JoinHandle<()>>,
    last_track: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn StationAdapter>,
        driver: Arc<dyn PlaybackDriver>,
        token: Arc<TokenCell>,
        downloads: Arc<DownloadGuard>,
        session: Session,
        reports: mpsc::Sender<TaskReport>,
    ) -> (Self, PlayerHandle) {
        let (skip_tx, skip_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            driver,
            status: Mutex::new(PlayerStatus::default()),
            current: RwLock::new(None),
            signal_gate: Mutex::new(None),
            skip_tx,
            downloads,
            download_root: session.download_root.clone(),
            station_key: adapter.key().to_string(),
            reports,
        });
        let handle = PlayerHandle {
            shared: shared.clone(),
        };
        let orchestrator = Self {
            shared,
            adapter,
            token,
            session,
            skip_rx,
            play_task: None,
            refresh_task: None,
            last_track: None,
        };
        (orchestrator, handle)
    }

    /// Play until retrieval fails for good.
    pub async fn run(mut self) -> Result<(), FatalError> {
        info!("Playing: {}", self.session.channel_title);
        loop {
            let chunk = self.retrieve_chunk().await?;
            self.play_chunk(chunk).await;
        }
    }

    async fn retrieve_chunk(&mut self) -> Result<Channel, FatalError> {
        // A proactive refresh still in flight must land before the next fetch.
        if let Some(task) = self.refresh_task.take() {
            let _ = task.await;
        }

        let adapter = self.adapter.as_ref();
        let token = self.token.as_ref();
        let channel_id = self.session.channel_id;
        let mut chunk = self
            .session
            .retry
            .run("tracks", |_| async move {
                let current = match token.settled().await {
                    Some(t) => t,
                    None => token.refresh(adapter).await?,
                };
                match adapter.fetch_chunk(channel_id, &current).await {
                    Ok(chunk) if chunk.tracks.is_empty() => Err(FetchError::EmptyChunk(channel_id)),
                    Ok(chunk) => Ok(chunk),
                    Err(e) => {
                        // Next attempt starts from a fresh token.
                        token.invalidate().await;
                        Err(e)
                    }
                }
            })
            .await?;
        chunk.title = self.session.channel_title.clone();
        Ok(chunk)
    }

    async fn play_chunk(&mut self, chunk: Channel) {
        debug!("{} tracks retrieved", chunk.tracks.len());
        debug!("Tracks:\n{}", chunk.listing());

        let refresh_in = chunk.length.saturating_sub(self.session.token_margin);
        debug!("Token refresh in {}", format_time(refresh_in.as_secs()));
        let mut token_timer: Option<Pin<Box<Sleep>>> = Some(Box::pin(sleep(refresh_in)));
        let last = chunk.tracks.len().saturating_sub(1);

        for (index, track) in chunk.tracks.iter().enumerate() {
            *self.shared.current.write().await = Some(NowPlaying {
                channel_id: chunk.id,
                channel_title: chunk.title.clone(),
                track: track.clone(),
                index,
                chunk_len: chunk.tracks.len(),
            });

            if self.adapter.is_live() && self.last_track == Some(track.id) {
                debug!("Track {} is still on air", track.id);
            } else {
                info!("{}", track.display_title());
                self.start_play(track.url.clone());
            }
            self.last_track = Some(track.id);

            let track_end = sleep(track.duration);
            tokio::pin!(track_end);
            let how = loop {
                tokio::select! {
                    biased;
                    _ = token_deadline(&mut token_timer) => {
                        token_timer = None;
                        self.spawn_token_refresh();
                    }
                    Some(()) = self.skip_rx.recv() => break Advance::Skipped,
                    _ = &mut track_end => break Advance::Finished,
                }
            };

            if how == Advance::Skipped && index == last {
                debug!("Last track of the chunk skipped, refreshing token now");
                token_timer = None;
                self.refresh_token_now().await;
            }
            self.advance(how).await;
        }
    }

    fn start_play(&mut self, url: String) {
        let shared = self.shared.clone();
        self.play_task = Some(tokio::spawn(async move { shared.play(&url).await }));
    }

    /// Stop the engine between two tracks without touching the recorded
    /// status. Live stations keep playing on natural track end so the next
    /// on-air track can take over without a gap.
    async fn advance(&mut self, how: Advance) {
        if let Some(task) = self.play_task.take() {
            if !task.is_finished() {
                debug!("Cancelling superseded play request");
                task.abort();
            }
        }
        if how == Advance::Skipped {
            info!("Skipped");
            self.last_track = None;
        } else if self.adapter.is_live() {
            return;
        }

        let mut status = self.shared.status.lock().await;
        let previous = *status;
        if let Err(e) = self.shared.driver.stop().await {
            warn!("Stop failed: {:#}", e);
        }
        *status = previous;
    }

    fn spawn_token_refresh(&mut self) {
        debug!("Audio token is about to expire, refreshing");
        let adapter = self.adapter.clone();
        let token = self.token.clone();
        let reports = self.shared.reports.clone();
        self.refresh_task = Some(tokio::spawn(async move {
            let report = match token.refresh(adapter.as_ref()).await {
                Ok(_) => TaskReport::TokenRefreshed,
                Err(e) => TaskReport::TokenRefreshFailed(e.to_string()),
            };
            let _ = reports.send(report).await;
        }));
    }

    async fn refresh_token_now(&self) {
        if let Err(e) = self.token.refresh(self.adapter.as_ref()).await {
            warn!("Forced token refresh failed: {}", e);
            self.token.invalidate().await;
        }
    }
}

/// A player handle wired to mocks, with no playback loop behind it.
#[cfg(test)]
pub(crate) fn test_player() -> (PlayerHandle, Arc<crate::driver::mock::RecordingDriver>) {
    let driver = Arc::new(crate::driver::mock::RecordingDriver::default());
    (test_player_with(driver.clone()), driver)
}

#[cfg(test)]
pub(crate) fn test_player_with(driver: Arc<crate::driver::mock::RecordingDriver>) -> PlayerHandle {
    use crate::download::mock::{FakeTagger, FakeTranscoder};
    use crate::station::mock::{track, MockStation};

    let downloads = Arc::new(DownloadGuard::new(
        Arc::new(FakeTranscoder::default()),
        Arc::new(FakeTagger::default()),
    ));
    let (reports, _) = mpsc::channel(1);
    let session = Session {
        channel_id: 1,
        channel_title: "Test".to_string(),
        token_margin: Duration::from_secs(5),
        retry: RetryPolicy::default(),
        download_root: std::env::temp_dir(),
    };
    let (_, handle) = Orchestrator::new(
        Arc::new(MockStation::new(Channel::new(1, None, vec![track(1, 60)]))),
        driver,
        Arc::new(TokenCell::new()),
        downloads,
        session,
        reports,
    );
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::mock::{FakeTagger, FakeTranscoder};
    use crate::driver::mock::RecordingDriver;
    use crate::station::mock::{track, MockStation};
    use tempfile::TempDir;

    struct Rig {
        handle: PlayerHandle,
        driver: Arc<RecordingDriver>,
        station: Arc<MockStation>,
        transcoder: Arc<FakeTranscoder>,
        reports: mpsc::Receiver<TaskReport>,
        task: JoinHandle<Result<(), FatalError>>,
        dir: TempDir,
    }

    fn chunk(tracks: Vec<Track>) -> Channel {
        Channel::new(7, None, tracks)
    }

    fn start(station: MockStation, token_margin: Duration) -> Rig {
        let dir = TempDir::new().unwrap();
        let station = Arc::new(station);
        let driver = Arc::new(RecordingDriver::default());
        let transcoder = Arc::new(FakeTranscoder::default());
        let downloads = Arc::new(DownloadGuard::new(
            transcoder.clone(),
            Arc::new(FakeTagger::default()),
        ));
        let (reports_tx, reports) = mpsc::channel(16);
        let session = Session {
            channel_id: 7,
            channel_title: "Mock Channel".to_string(),
            token_margin,
            retry: RetryPolicy::default(),
            download_root: dir.path().to_path_buf(),
        };
        let (orchestrator, handle) = Orchestrator::new(
            station.clone(),
            driver.clone(),
            Arc::new(TokenCell::with_token("initial".to_string())),
            downloads,
            session,
            reports_tx,
        );
        let task = tokio::spawn(orchestrator.run());
        Rig {
            handle,
            driver,
            station,
            transcoder,
            reports,
            task,
            dir,
        }
    }

    /// Next download outcome; token refresh reports are skipped.
    async fn next_download_report(rx: &mut mpsc::Receiver<TaskReport>) -> TaskReport {
        loop {
            match rx.recv().await.unwrap() {
                TaskReport::TokenRefreshed | TaskReport::TokenRefreshFailed(_) => continue,
                report => return report,
            }
        }
    }

    async fn advance_to(secs: u64, started: Instant) {
        tokio::time::sleep_until(started + Duration::from_secs(secs)).await;
    }

    fn url(id: u64) -> String {
        format!("play https://cdn.example/{}.mp4", id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_play_in_order_with_stop_between() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 60), track(2, 30)])),
            Duration::from_secs(5),
        );

        advance_to(1, t0).await;
        assert_eq!(rig.driver.plays(), vec![url(1)]);
        assert_eq!(rig.handle.now_playing().await.unwrap().track.id, 1);

        advance_to(61, t0).await;
        assert_eq!(rig.driver.calls(), vec![url(1), "stop".to_string(), url(2)]);
        assert_eq!(rig.handle.status().await, PlayerStatus::Playing);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_station_does_not_restart_track_still_on_air() {
        let t0 = Instant::now();
        let station = MockStation::new(chunk(vec![track(2, 30)])).live();
        station.push_chunk(chunk(vec![track(1, 60)]));
        station.push_chunk(chunk(vec![track(1, 5)]));
        let rig = start(station, Duration::from_secs(5));

        advance_to(64, t0).await;
        assert_eq!(rig.driver.calls(), vec![url(1)]);

        advance_to(66, t0).await;
        assert_eq!(rig.driver.calls(), vec![url(1), url(2)]);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_toggle_inside_debounce_window_changes_state_once() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 600)])),
            Duration::from_secs(5),
        );
        advance_to(1, t0).await;

        assert_eq!(rig.handle.catch(Signal::TogglePause, Instant::now()).await, Ok(()));
        assert_eq!(
            rig.handle.catch(Signal::TogglePause, Instant::now()).await,
            Err(SignalError::Debounced)
        );
        assert_eq!(rig.handle.status().await, PlayerStatus::Paused);
        assert_eq!(
            rig.driver.calls().iter().filter(|c| *c == "pause").count(),
            1
        );

        tokio::time::advance(DEBOUNCE_WINDOW).await;
        assert_eq!(rig.handle.catch(Signal::TogglePause, Instant::now()).await, Ok(()));
        assert_eq!(rig.handle.status().await, PlayerStatus::Playing);
        assert!(rig.driver.calls().contains(&"resume".to_string()));
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_status_survives_track_advance() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 60), track(2, 60)])),
            Duration::from_secs(5),
        );
        advance_to(1, t0).await;
        rig.handle.catch(Signal::TogglePause, Instant::now()).await.unwrap();

        advance_to(61, t0).await;
        assert_eq!(rig.handle.status().await, PlayerStatus::Paused);
        assert_eq!(
            rig.driver.calls(),
            vec![
                url(1),
                "pause".to_string(),
                "stop".to_string(),
                format!("{} paused", url(2)),
            ]
        );
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_play_still_advances_on_track_end_and_skip() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 60), track(2, 300), track(3, 300)])),
            Duration::from_secs(5),
        );
        rig.driver.fail_plays(2);

        advance_to(1, t0).await;
        assert_eq!(rig.driver.plays(), vec![url(1)]);
        assert_eq!(rig.handle.now_playing().await.unwrap().track.id, 1);

        advance_to(61, t0).await;
        assert_eq!(rig.driver.plays(), vec![url(1), url(2)]);

        rig.handle.catch(Signal::Next, Instant::now()).await.unwrap();
        advance_to(62, t0).await;
        assert_eq!(rig.driver.plays(), vec![url(1), url(2), url(3)]);
        assert_eq!(rig.handle.status().await, PlayerStatus::Playing);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_moves_to_next_track_without_token_refresh() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 300), track(2, 300)])),
            Duration::from_secs(5),
        );
        advance_to(1, t0).await;

        rig.handle.catch(Signal::Next, Instant::now()).await.unwrap();
        advance_to(2, t0).await;

        assert_eq!(rig.driver.plays(), vec![url(1), url(2)]);
        assert_eq!(rig.station.token_calls(), 0);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_on_last_track_refreshes_token_before_next_fetch() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 600)])),
            Duration::from_secs(5),
        );
        advance_to(1, t0).await;

        rig.handle.catch(Signal::Next, Instant::now()).await.unwrap();
        advance_to(2, t0).await;

        assert_eq!(
            rig.station.log(),
            vec!["chunk initial", "token token-1", "chunk token-1"]
        );
        assert_eq!(rig.driver.plays(), vec![url(1), url(1)]);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_refreshed_ahead_of_chunk_end() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 100), track(2, 100)])),
            Duration::from_secs(5),
        );

        advance_to(196, t0).await;
        assert_eq!(rig.station.log(), vec!["chunk initial", "token token-1"]);

        advance_to(201, t0).await;
        assert_eq!(
            rig.station.log(),
            vec!["chunk initial", "token token-1", "chunk token-1"]
        );
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_timer_coinciding_with_chunk_end_uses_fresh_token() {
        let t0 = Instant::now();
        let rig = start(
            MockStation::new(chunk(vec![track(1, 100)])).with_token_delay(Duration::from_secs(2)),
            Duration::ZERO,
        );

        advance_to(110, t0).await;
        assert_eq!(
            rig.station.log(),
            vec!["chunk initial", "token token-1", "chunk token-1"]
        );
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_due_when_last_track_ends_uses_fresh_token() {
        let t0 = Instant::now();
        let window = Channel {
            length: Duration::from_secs(1800),
            ..chunk(vec![track(1, 1795)])
        };
        let rig = start(
            MockStation::new(window).with_token_delay(Duration::from_secs(2)),
            Duration::from_secs(5),
        );

        advance_to(1794, t0).await;
        assert_eq!(rig.station.log(), vec!["chunk initial"]);

        advance_to(1800, t0).await;
        assert_eq!(
            rig.station.log(),
            vec!["chunk initial", "token token-1", "chunk token-1"]
        );
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_chunk_failures_then_playback_proceeds() {
        let t0 = Instant::now();
        let station = MockStation::new(chunk(vec![track(1, 600)]));
        station.fail_chunks(2);
        let rig = start(station, Duration::from_secs(5));

        advance_to(9, t0).await;
        assert!(rig.driver.plays().is_empty());

        advance_to(11, t0).await;
        assert_eq!(rig.driver.plays(), vec![url(1)]);
        assert_eq!(rig.station.chunk_calls(), 3);
        rig.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_chunk_failures_are_fatal() {
        let station = MockStation::new(chunk(vec![track(1, 600)]));
        station.fail_chunks(3);
        let rig = start(station, Duration::from_secs(5));

        let result = rig.task.await.unwrap();
        assert!(matches!(
            result,
            Err(FatalError::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(rig.driver.plays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_signal_saves_current_track_once() {
        let t0 = Instant::now();
        let mut rig = start(
            MockStation::new(chunk(vec![track(1, 600)])),
            Duration::from_secs(5),
        );
        advance_to(1, t0).await;

        rig.handle.catch(Signal::Download, Instant::now()).await.unwrap();
        let expected = rig
            .dir
            .path()
            .join("mock")
            .join("Mock Channel")
            .join("Artist 1 - Title 1.mp3");
        assert_eq!(
            next_download_report(&mut rig.reports).await,
            TaskReport::Downloaded(expected.clone())
        );

        advance_to(2, t0).await;
        rig.handle.catch(Signal::Download, Instant::now()).await.unwrap();
        assert_eq!(
            next_download_report(&mut rig.reports).await,
            TaskReport::DownloadSkipped(expected)
        );
        assert_eq!(rig.transcoder.calls(), 1);
        rig.task.abort();
    }
}
