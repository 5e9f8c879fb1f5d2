use std::sync::Arc;

use chunkferry_storage::{StorageError, StorageGateway};

use crate::layout::StorageLayout;

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledArtifact {
    pub session_id: String,
    /// Storage key of the final file.
    pub key: String,
    pub size: u64,
}

/// Assembly failures. Both variants abort the session and purge its
/// working area.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("session {session_id}: chunk {ordinal} is missing")]
    MissingChunk { session_id: String, ordinal: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Concatenates a session's chunks into its final artifact.
///
/// The whole file is buffered in memory before it is written, so the
/// artifact either appears complete or not at all.
pub struct ChunkAssembler {
    storage: Arc<dyn StorageGateway>,
    layout: StorageLayout,
    max_chunk_size: usize,
}

impl ChunkAssembler {
    pub fn new(storage: Arc<dyn StorageGateway>, layout: StorageLayout, max_chunk_size: usize) -> Self {
        Self {
            storage,
            layout,
            max_chunk_size,
        }
    }

    /// Reads chunks `1..=total_chunks` in order and writes the artifact.
    ///
    /// Stops at the first missing chunk. The working area is removed on
    /// success and on failure.
    pub async fn assemble(
        &self,
        session_id: &str,
        total_chunks: u32,
        file_name: &str,
        total_size: u64,
    ) -> Result<AssembledArtifact, AssemblyError> {
        tracing::debug!(session_id, file_name, total_chunks, "assembling chunks");

        let result = self
            .merge_and_store(session_id, total_chunks, file_name, total_size)
            .await;
        self.purge(session_id).await;

        match &result {
            Ok(artifact) => tracing::info!(
                session_id,
                key = %artifact.key,
                size = artifact.size,
                "upload assembled"
            ),
            Err(e) => tracing::error!(session_id, error = %e, "assembly aborted"),
        }
        result
    }

    async fn merge_and_store(
        &self,
        session_id: &str,
        total_chunks: u32,
        file_name: &str,
        total_size: u64,
    ) -> Result<AssembledArtifact, AssemblyError> {
        let mut buf = Vec::new();
        let bound = u64::from(total_chunks).saturating_mul(self.max_chunk_size as u64);
        let capacity = usize::try_from(total_size.min(bound)).unwrap_or(usize::MAX);
        if buf.try_reserve_exact(capacity).is_err() {
            tracing::warn!(session_id, capacity, "pre-allocation failed, growing on demand");
        }

        for ordinal in 1..=total_chunks {
            let key = self.layout.chunk_key(session_id, file_name, ordinal);
            match self.storage.get(&key).await {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(StorageError::NotFound(_)) => {
                    return Err(AssemblyError::MissingChunk {
                        session_id: session_id.to_string(),
                        ordinal,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        let size = buf.len() as u64;
        if size != total_size {
            tracing::warn!(
                session_id,
                declared = total_size,
                actual = size,
                "assembled size differs from declared size"
            );
        }

        let key = self.layout.artifact_key(session_id, file_name);
        self.storage.put(&key, &buf).await?;

        Ok(AssembledArtifact {
            session_id: session_id.to_string(),
            key,
            size,
        })
    }

    async fn purge(&self, session_id: &str) {
        let working = self.layout.working_area(session_id);
        if let Err(e) = self.storage.delete_dir_all(&working).await {
            tracing::warn!(session_id, error = %e, "failed to remove working area");
        }
    }
}
