use crate::core::PlayerHandle;
use crate::hotkeys::{Bindings, RawInput, Received};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use xradio_proto::model::Signal;

#[derive(Clone)]
struct HttpState {
    bindings: Arc<Bindings>,
    player: PlayerHandle,
    input_tx: mpsc::Sender<Received>,
}

#[derive(Debug, Serialize, PartialEq)]
struct NowPlayingView {
    status: String,
    channel: Option<String>,
    track: Option<TrackView>,
}

#[derive(Debug, Serialize, PartialEq)]
struct TrackView {
    artist: String,
    title: String,
    album: String,
    duration_secs: u64,
    /// 1-based position in the current chunk.
    position: usize,
    of: usize,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    bindings: Arc<Bindings>,
    player: PlayerHandle,
    input_tx: mpsc::Sender<Received>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState {
            bindings,
            player,
            input_tx,
        });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind hotkey bridge to {}: {}", addr, e);
                return;
            }
        };

        info!("Hotkey bridge listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Hotkey bridge error: {}", e);
        }
    })
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/key/:key", get(press_key).post(press_key))
        .route("/api/signal/:name", get(send_signal).post(send_signal))
        .route("/api/now-playing", get(now_playing))
        .with_state(state)
}

async fn press_key(State(state): State<HttpState>, Path(key): Path<String>) -> StatusCode {
    if state.bindings.resolve(&key).is_none() {
        debug!("HTTP: key {} is not bound", key);
        return StatusCode::NOT_FOUND;
    }
    forward(&state, RawInput::Key(key)).await
}

async fn send_signal(State(state): State<HttpState>, Path(name): Path<String>) -> StatusCode {
    match name.parse::<Signal>() {
        Ok(signal) => forward(&state, RawInput::Signal(signal)).await,
        Err(e) => {
            debug!("HTTP: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn forward(state: &HttpState, input: RawInput) -> StatusCode {
    let received = Received::now(input);
    debug!("HTTP: {:?}", received.input);
    if state.input_tx.send(received).await.is_err() {
        error!("Signal router is gone");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn now_playing(State(state): State<HttpState>) -> Json<NowPlayingView> {
    let status = state.player.status().await.to_string();
    let view = match state.player.now_playing().await {
        Some(now) => NowPlayingView {
            status,
            channel: Some(now.channel_title),
            track: Some(TrackView {
                artist: now.track.artist,
                title: now.track.title,
                album: now.track.album,
                duration_secs: now.track.duration.as_secs(),
                position: now.index + 1,
                of: now.chunk_len,
            }),
        },
        None => NowPlayingView {
            status,
            channel: None,
            track: None,
        },
    };
    Json(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_player;

    fn state() -> (HttpState, mpsc::Receiver<Received>) {
        let (player, _) = test_player();
        let (input_tx, rx) = mpsc::channel(4);
        let state = HttpState {
            bindings: Arc::new(Bindings::default()),
            player,
            input_tx,
        };
        (state, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_key_is_forwarded_with_arrival_time() {
        let (state, mut rx) = state();
        let pressed = tokio::time::Instant::now();
        let code = press_key(State(state), Path("Control-Shift-l".to_string())).await;
        assert_eq!(code, StatusCode::ACCEPTED);

        tokio::time::advance(std::time::Duration::from_millis(5)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.input, RawInput::Key("Control-Shift-l".to_string()));
        assert_eq!(received.arrived, pressed);
    }

    #[tokio::test]
    async fn test_unbound_key_is_not_found() {
        let (state, mut rx) = state();
        let code = press_key(State(state), Path("F12".to_string())).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_signal_is_bad_request() {
        let (state, _rx) = state();
        let code = send_signal(State(state.clone()), Path("volume-up".to_string())).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let code = send_signal(State(state), Path("sig-download".to_string())).await;
        assert_eq!(code, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_now_playing_before_first_track() {
        let (state, _rx) = state();
        let Json(view) = now_playing(State(state)).await;
        assert_eq!(
            view,
            NowPlayingView {
                status: "playing".to_string(),
                channel: None,
                track: None,
            }
        );
    }
}
