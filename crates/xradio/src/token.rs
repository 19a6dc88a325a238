//! Access token shared by the retrieval path, the proactive refresh timer and
//! the forced refresh on a skipped last track.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::station::{FetchError, StationAdapter};

/// At most one refresh talks to the station at a time. A caller that had to
/// wait for someone else's refresh takes that result instead of fetching
/// again.
#[derive(Default)]
pub struct TokenCell {
    current: RwLock<Option<String>>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: String) -> Self {
        Self {
            current: RwLock::new(Some(token)),
            generation: AtomicU64::new(1),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    /// Like [`get`](Self::get) but waits for an in-flight refresh first.
    pub async fn settled(&self) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;
        self.get().await
    }

    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn refresh(&self, adapter: &dyn StationAdapter) -> Result<String, FetchError> {
        let seen = self.generation();
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != seen {
            if let Some(token) = self.get().await {
                debug!("Audio token was refreshed meanwhile, reusing it");
                return Ok(token);
            }
        }

        let token = adapter.fetch_token().await?;
        if token.is_empty() {
            return Err(FetchError::InvalidToken);
        }
        *self.current.write().await = Some(token.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!("Got audio token: {}", token);
        Ok(token)
    }
}
