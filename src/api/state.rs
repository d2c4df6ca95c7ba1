// src/api/state.rs
use crate::client::SegmentationApi;
use crate::config::AppConfig;
use crate::session::SessionHandle;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

struct SessionEntry {
    handle: SessionHandle,
    last_used: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api: Arc<dyn SegmentationApi>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl AppState {
    pub fn new(config: AppConfig, api: Arc<dyn SegmentationApi>) -> Self {
        Self {
            config: Arc::new(config),
            api,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens a new session, one per browser page.
    ///
    /// Idle sessions are pruned first; at capacity the least recently used
    /// session is evicted.
    pub async fn create_session(&self) -> SessionHandle {
        self.prune_idle(Instant::now()).await;

        let handle = SessionHandle::new(self.api.clone());
        let mut sessions = self.sessions.write().await;
        while sessions.len() >= self.config.server.max_sessions.max(1) {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    info!("Evicted least recently used session {}", id);
                }
                None => break,
            }
        }
        sessions.insert(
            handle.id(),
            SessionEntry { handle: handle.clone(), last_used: Instant::now() },
        );
        handle
    }

    /// Looks up a session and marks it as used.
    pub async fn session(&self, id: &Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.handle.clone())
    }

    /// Forgets a session. A submission already running for it still completes.
    pub async fn close_session(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drops sessions that have been idle longer than the configured timeout
    /// as of `now`. Returns how many were dropped.
    pub async fn prune_idle(&self, now: Instant) -> usize {
        let timeout = self.config.server.session_idle_timeout();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_used) <= timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!("Pruned {} idle session(s)", pruned);
        }
        pruned
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
