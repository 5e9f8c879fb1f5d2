use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use chunkferry_protocol::{ChunkMeta, SessionStatus};
use chunkferry_transfer::{SessionError, UploadSession};

/// Tracks upload sessions by id.
///
/// Sessions are created lazily by their first chunk. Finished sessions stay
/// visible for status queries until `retained` newer ones have finished,
/// oldest evicted first. Open sessions that receive no chunk for
/// `idle_timeout` are aborted by [`sweep_idle`](Self::sweep_idle). The lock
/// only guards map updates; callers never hold it across I/O.
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    retained: usize,
    idle_timeout: Duration,
}

struct RegistryInner {
    sessions: HashMap<String, Arc<UploadSession>>,
    /// Last chunk arrival per open session.
    last_seen: HashMap<String, Instant>,
    finished: VecDeque<String>,
}

impl SessionRegistry {
    pub fn new(retained: usize, idle_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                sessions: HashMap::new(),
                last_seen: HashMap::new(),
                finished: VecDeque::new(),
            }),
            retained,
            idle_timeout,
        }
    }

    /// Returns the open session for `meta`, creating it on first sight.
    ///
    /// Fails if the session is no longer open or if `meta` declares a
    /// different transfer than the session's first chunk did.
    pub fn open_or_get(&self, meta: &ChunkMeta) -> Result<Arc<UploadSession>, SessionError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(session) = inner.sessions.get(&meta.session_id).cloned() {
            session.ensure_open()?;
            session.check_metadata(meta)?;
            inner
                .last_seen
                .insert(meta.session_id.clone(), Instant::now());
            return Ok(session);
        }

        let session = Arc::new(UploadSession::new(meta));
        inner
            .sessions
            .insert(meta.session_id.clone(), Arc::clone(&session));
        inner
            .last_seen
            .insert(meta.session_id.clone(), Instant::now());
        tracing::info!(
            session_id = %meta.session_id,
            file_name = %meta.file_name,
            total_chunks = meta.total_chunks,
            total_size = meta.total_size,
            "upload session opened"
        );
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<UploadSession>> {
        let inner = self.inner.read().unwrap();
        inner.sessions.get(session_id).cloned()
    }

    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.get(session_id).map(|s| s.status())
    }

    /// Moves a session into a terminal state and applies retention.
    pub fn finish(&self, session: &UploadSession, completed: bool) {
        if completed {
            session.complete();
        } else {
            session.abort();
        }

        let id = session.id();
        let mut inner = self.inner.write().unwrap();
        inner.last_seen.remove(&id);
        inner.finished.push_back(id);
        while inner.finished.len() > self.retained {
            if let Some(evicted) = inner.finished.pop_front() {
                inner.sessions.remove(&evicted);
                tracing::debug!(session_id = %evicted, "evicted finished session");
            }
        }
    }

    /// Aborts and forgets open sessions idle for longer than the timeout.
    ///
    /// Returns the swept ids so the caller can purge their working areas.
    pub fn sweep_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.inner.write().unwrap();
        let idle: Vec<String> = inner
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > self.idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut swept = Vec::with_capacity(idle.len());
        for id in idle {
            inner.last_seen.remove(&id);
            let Some(session) = inner.sessions.get(&id).cloned() else {
                continue;
            };
            // A session already assembling is finished by its own request.
            if session.ensure_open().is_err() {
                continue;
            }
            session.abort();
            inner.sessions.remove(&id);
            tracing::info!(session_id = %id, "idle upload session aborted");
            swept.push(id);
        }
        swept
    }

    /// Number of tracked sessions, open or finished.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkferry_protocol::SessionState;

    const IDLE: Duration = Duration::from_secs(60);

    fn meta(session_id: &str) -> ChunkMeta {
        ChunkMeta {
            session_id: session_id.into(),
            file_name: "f.bin".into(),
            ordinal: 1,
            total_chunks: 2,
            total_size: 20,
            is_last: false,
        }
    }

    #[test]
    fn open_or_get_reuses_session() {
        let registry = SessionRegistry::new(4, IDLE);
        let a = registry.open_or_get(&meta("s1")).unwrap();
        let b = registry.open_or_get(&meta("s1")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn finished_session_refuses_chunks() {
        let registry = SessionRegistry::new(4, IDLE);
        let session = registry.open_or_get(&meta("s1")).unwrap();
        registry.finish(&session, true);

        let err = registry.open_or_get(&meta("s1")).unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotOpen {
                state: SessionState::Completed,
                ..
            }
        ));
        assert_eq!(
            registry.status("s1").unwrap().state,
            SessionState::Completed
        );
    }

    #[test]
    fn mismatched_metadata_is_refused() {
        let registry = SessionRegistry::new(4, IDLE);
        registry.open_or_get(&meta("s1")).unwrap();

        let mut other = meta("s1");
        other.total_size = 21;
        assert!(matches!(
            registry.open_or_get(&other),
            Err(SessionError::MetadataMismatch { .. })
        ));
    }

    #[test]
    fn retention_evicts_oldest_finished() {
        let registry = SessionRegistry::new(2, IDLE);
        for id in ["a", "b", "c"] {
            let session = registry.open_or_get(&meta(id)).unwrap();
            registry.finish(&session, false);
        }
        let open = registry.open_or_get(&meta("d")).unwrap();

        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
        assert!(registry.get("c").is_some());
        assert_eq!(open.state(), SessionState::Open);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unknown_session_has_no_status() {
        let registry = SessionRegistry::new(1, IDLE);
        assert!(registry.is_empty());
        assert!(registry.status("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_open_sessions_are_swept() {
        let registry = SessionRegistry::new(4, IDLE);
        let stale = registry.open_or_get(&meta("stale")).unwrap();
        let done = registry.open_or_get(&meta("done")).unwrap();
        registry.finish(&done, true);

        tokio::time::advance(Duration::from_secs(45)).await;
        registry.open_or_get(&meta("fresh")).unwrap();
        assert!(registry.sweep_idle().is_empty());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(registry.sweep_idle(), vec!["stale".to_string()]);
        assert_eq!(stale.state(), SessionState::Aborted);
        assert!(registry.get("stale").is_none());
        assert!(registry.get("fresh").is_some());
        assert_eq!(registry.status("done").unwrap().state, SessionState::Completed);

        // A swept id starts over as a new session.
        let reopened = registry.open_or_get(&meta("stale")).unwrap();
        assert_eq!(reopened.state(), SessionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_arrival_keeps_session_alive() {
        let registry = SessionRegistry::new(4, IDLE);
        registry.open_or_get(&meta("s1")).unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(50)).await;
            registry.open_or_get(&meta("s1")).unwrap();
        }
        assert!(registry.sweep_idle().is_empty());
    }
}
