use std::collections::BTreeMap;
use std::sync::RwLock;

use chunkferry_protocol::{ChunkMeta, SessionState, SessionStatus};

/// Errors raised by session state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {id} is {state:?}, not open")]
    NotOpen { id: String, state: SessionState },

    #[error("session {id}: declared {field} changed between chunks")]
    MetadataMismatch { id: String, field: &'static str },
}

/// Tracks one upload session on the receiving side (thread-safe).
///
/// State machine: `Open -> Assembling -> Completed | Aborted`. A session may
/// also be aborted straight from `Open`.
#[derive(Debug)]
pub struct UploadSession {
    inner: RwLock<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    file_name: String,
    total_chunks: u32,
    total_size: u64,
    state: SessionState,
    /// Ordinal -> stored size. Re-sent ordinals overwrite, never double count.
    received: BTreeMap<u32, u64>,
}

impl UploadSession {
    /// Opens a session from the metadata of its first chunk.
    pub fn new(meta: &ChunkMeta) -> Self {
        Self {
            inner: RwLock::new(SessionInner {
                id: meta.session_id.clone(),
                file_name: meta.file_name.clone(),
                total_chunks: meta.total_chunks,
                total_size: meta.total_size,
                state: SessionState::Open,
                received: BTreeMap::new(),
            }),
        }
    }

    /// Checks that a later chunk declares the same transfer as the first one.
    pub fn check_metadata(&self, meta: &ChunkMeta) -> Result<(), SessionError> {
        let s = self.inner.read().unwrap();
        let field = if s.file_name != meta.file_name {
            "file name"
        } else if s.total_chunks != meta.total_chunks {
            "chunk count"
        } else if s.total_size != meta.total_size {
            "total size"
        } else {
            return Ok(());
        };
        Err(SessionError::MetadataMismatch {
            id: s.id.clone(),
            field,
        })
    }

    /// Fails unless the session still accepts chunks.
    pub fn ensure_open(&self) -> Result<(), SessionError> {
        let s = self.inner.read().unwrap();
        if s.state == SessionState::Open {
            Ok(())
        } else {
            Err(SessionError::NotOpen {
                id: s.id.clone(),
                state: s.state,
            })
        }
    }

    /// Records a persisted chunk.
    pub fn record_chunk(&self, ordinal: u32, size: u64) {
        let mut s = self.inner.write().unwrap();
        s.received.insert(ordinal, size);
    }

    /// Moves `Open -> Assembling`. Only one caller can win this transition.
    pub fn begin_assembly(&self) -> Result<(), SessionError> {
        let mut s = self.inner.write().unwrap();
        if s.state != SessionState::Open {
            return Err(SessionError::NotOpen {
                id: s.id.clone(),
                state: s.state,
            });
        }
        s.state = SessionState::Assembling;
        Ok(())
    }

    /// Marks the session as completed.
    pub fn complete(&self) {
        self.finish(SessionState::Completed);
    }

    /// Marks the session as aborted.
    pub fn abort(&self) {
        self.finish(SessionState::Aborted);
    }

    fn finish(&self, state: SessionState) {
        let mut s = self.inner.write().unwrap();
        s.state = state;
    }

    /// Returns a protocol-level summary.
    pub fn status(&self) -> SessionStatus {
        let s = self.inner.read().unwrap();
        SessionStatus {
            session_id: s.id.clone(),
            file_name: s.file_name.clone(),
            state: s.state,
            total_chunks: s.total_chunks,
            total_size: s.total_size,
            received_chunks: s.received.len() as u32,
            received_bytes: s.received.values().sum(),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> String {
        let s = self.inner.read().unwrap();
        s.id.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        let s = self.inner.read().unwrap();
        s.state
    }
}
