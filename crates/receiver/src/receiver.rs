use std::sync::Arc;
use std::time::Duration;

use chunkferry_protocol::{ChunkMeta, ReceiverLimits, SessionStatus};
use chunkferry_storage::{StorageError, StorageGateway};
use chunkferry_transfer::validate_path_segment;

use crate::ReceiverError;
use crate::assembler::{AssembledArtifact, ChunkAssembler};
use crate::config::ReceiverConfig;
use crate::layout::StorageLayout;
use crate::registry::SessionRegistry;

/// One uploaded chunk: metadata plus payload.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub meta: ChunkMeta,
    pub payload: Vec<u8>,
}

/// Successful result of [`ChunkReceiver::receive_chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The chunk was persisted; more are expected.
    Accepted { session_id: String, ordinal: u32 },
    /// The last chunk was persisted and the file assembled.
    Completed(AssembledArtifact),
}

/// Persists incoming chunks and triggers assembly on the last one.
pub struct ChunkReceiver {
    storage: Arc<dyn StorageGateway>,
    layout: StorageLayout,
    registry: SessionRegistry,
    assembler: ChunkAssembler,
    chunk_size: usize,
    save_retries: u32,
    save_retry_delay: Duration,
}

impl ChunkReceiver {
    pub fn new(config: &ReceiverConfig, storage: Arc<dyn StorageGateway>) -> Self {
        let layout = StorageLayout::new(&config.staging_area_name, &config.final_area_name);
        Self {
            assembler: ChunkAssembler::new(Arc::clone(&storage), layout.clone(), config.chunk_size),
            storage,
            layout,
            registry: SessionRegistry::new(config.retained_sessions, config.session_idle_timeout),
            chunk_size: config.chunk_size,
            save_retries: config.save_retries,
            save_retry_delay: config.save_retry_delay,
        }
    }

    /// Largest accepted payload per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn limits(&self) -> ReceiverLimits {
        ReceiverLimits {
            chunk_size: self.chunk_size,
        }
    }

    pub fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.registry.status(session_id)
    }

    /// Validates, persists and records one chunk.
    ///
    /// For the chunk flagged as last, assembly runs before this returns.
    pub async fn receive_chunk(&self, upload: ChunkUpload) -> Result<ReceiveOutcome, ReceiverError> {
        let ChunkUpload { meta, payload } = upload;
        self.validate(&meta, &payload)?;
        self.purge_idle_sessions().await;

        let session = self.registry.open_or_get(&meta)?;
        let key = self
            .layout
            .chunk_key(&meta.session_id, &meta.file_name, meta.ordinal);
        self.save_chunk(&meta.session_id, &key, &payload).await?;
        session.record_chunk(meta.ordinal, payload.len() as u64);
        tracing::debug!(
            session_id = %meta.session_id,
            ordinal = meta.ordinal,
            total_chunks = meta.total_chunks,
            size = payload.len(),
            "chunk stored"
        );

        if !meta.is_last {
            return Ok(ReceiveOutcome::Accepted {
                session_id: meta.session_id,
                ordinal: meta.ordinal,
            });
        }

        session.begin_assembly()?;
        let result = self
            .assembler
            .assemble(
                &meta.session_id,
                meta.total_chunks,
                &meta.file_name,
                meta.total_size,
            )
            .await;
        self.registry.finish(&session, result.is_ok());
        Ok(ReceiveOutcome::Completed(result?))
    }

    /// Aborts sessions idle past the timeout and drops their working areas.
    async fn purge_idle_sessions(&self) {
        for session_id in self.registry.sweep_idle() {
            let working = self.layout.working_area(&session_id);
            if let Err(e) = self.storage.delete_dir_all(&working).await {
                tracing::warn!(%session_id, error = %e, "failed to purge idle working area");
            }
        }
    }

    fn validate(&self, meta: &ChunkMeta, payload: &[u8]) -> Result<(), ReceiverError> {
        validate_path_segment("session id", &meta.session_id)?;
        validate_path_segment("file name", &meta.file_name)?;

        if payload.is_empty() {
            return Err(ReceiverError::Validation("empty chunk payload".into()));
        }
        if payload.len() > self.chunk_size {
            return Err(ReceiverError::Validation(format!(
                "chunk of {} bytes exceeds limit of {}",
                payload.len(),
                self.chunk_size
            )));
        }
        if meta.total_chunks == 0 {
            return Err(ReceiverError::Validation("totalChunks must be at least 1".into()));
        }
        if meta.ordinal == 0 || meta.ordinal > meta.total_chunks {
            return Err(ReceiverError::Validation(format!(
                "ordinal {} outside 1..={}",
                meta.ordinal, meta.total_chunks
            )));
        }
        if meta.is_last != (meta.ordinal == meta.total_chunks) {
            return Err(ReceiverError::Validation(format!(
                "isDone={} does not match ordinal {} of {}",
                meta.is_last, meta.ordinal, meta.total_chunks
            )));
        }
        Ok(())
    }

    /// Writes a chunk, retrying with a fixed delay. After the last failed
    /// attempt the key is removed so no partial chunk remains.
    async fn save_chunk(&self, session_id: &str, key: &str, payload: &[u8]) -> Result<(), ReceiverError> {
        let attempts = self.save_retries.saturating_add(1);
        let working = self.layout.working_area(session_id);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.try_save(&working, key, payload).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if attempt < attempts {
                tracing::warn!(
                    key,
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "chunk save failed, retrying in {:?}",
                    self.save_retry_delay
                );
                tokio::time::sleep(self.save_retry_delay).await;
                continue;
            }

            tracing::error!(key, attempts, error = %err, "chunk save failed, giving up");
            if let Err(cleanup) = self.storage.delete(key).await {
                tracing::warn!(key, error = %cleanup, "failed to remove chunk after save failure");
            }
            return Err(ReceiverError::Save {
                key: key.to_string(),
                attempts,
                source: err,
            });
        }
    }

    async fn try_save(&self, working: &str, key: &str, payload: &[u8]) -> Result<(), StorageError> {
        self.storage.create_dir_all(working).await?;
        self.storage.put(key, payload).await
    }
}
