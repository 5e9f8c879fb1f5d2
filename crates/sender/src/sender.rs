use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chunkferry_protocol::ChunkMeta;
use chunkferry_transfer::{ChunkReader, TransferError};

use crate::config::SenderConfig;
use crate::transport::{ChunkRequest, ChunkTransport};

/// Statuses that fail a chunk immediately, without the retry.
const REJECTION_STATUSES: [u16; 3] = [401, 403, 406];

/// Whether a failure aborted a multi-chunk transfer or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Bad input, or a single-chunk transfer that failed.
    Soft,
    /// A multi-chunk transfer aborted part way; later chunks were not sent.
    Fatal,
}

/// Outcome of [`ChunkSender::send`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    /// Session id, once a transfer was started.
    pub id: Option<String>,
    pub success: bool,
    pub message: String,
    pub failure: Option<FailureKind>,
}

impl SendResult {
    fn uploaded(id: String) -> Self {
        Self {
            id: Some(id),
            success: true,
            message: "uploaded".into(),
            failure: None,
        }
    }

    fn failed(id: Option<String>, message: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            id,
            success: false,
            message: message.into(),
            failure: Some(kind),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self::failed(None, message, FailureKind::Soft)
    }
}

/// A file to upload.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub url: String,
    pub file_path: PathBuf,
    pub headers: Vec<(String, String)>,
    /// Overrides [`SenderConfig::chunk_size`] for this transfer.
    pub chunk_size: Option<usize>,
}

/// Progress notifications emitted during a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    Started {
        session_id: String,
        file_name: String,
        total_chunks: u32,
        total_size: u64,
    },
    ChunkSent {
        session_id: String,
        ordinal: u32,
        total_chunks: u32,
        bytes_sent: u64,
    },
    Finished {
        session_id: String,
        success: bool,
    },
}

/// Sends files chunk by chunk, strictly in order.
pub struct ChunkSender {
    transport: Arc<dyn ChunkTransport>,
    config: SenderConfig,
    events: Option<mpsc::Sender<SendEvent>>,
}

impl ChunkSender {
    pub fn new(transport: Arc<dyn ChunkTransport>, config: SenderConfig) -> Self {
        Self {
            transport,
            config,
            events: None,
        }
    }

    /// Delivers [`SendEvent`]s to `events` during each transfer.
    pub fn with_events(mut self, events: mpsc::Sender<SendEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Uploads one file. Never panics on bad input; every outcome is a
    /// [`SendResult`].
    pub async fn send(&self, request: SendRequest) -> SendResult {
        if request.url.is_empty() {
            return SendResult::rejected("no upload url given");
        }
        if request.file_path.as_os_str().is_empty() {
            return SendResult::rejected("no file path given");
        }
        let Some(file_name) = request
            .file_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            return SendResult::rejected(format!(
                "unusable file name: {}",
                request.file_path.display()
            ));
        };

        let chunk_size = request.chunk_size.unwrap_or(self.config.chunk_size);
        let reader = match open_reader(&request.file_path, chunk_size).await {
            Ok(reader) => reader,
            Err(message) => return SendResult::rejected(message),
        };
        if reader.total_chunks() == 0 {
            return SendResult::rejected(format!("file is empty: {}", request.file_path.display()));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let total_chunks = reader.total_chunks();
        let total_size = reader.file_size();
        info!(
            %session_id,
            file = %request.file_path.display(),
            total_chunks,
            total_size,
            chunk_size = reader.chunk_size(),
            "starting upload"
        );
        self.emit(SendEvent::Started {
            session_id: session_id.clone(),
            file_name: file_name.clone(),
            total_chunks,
            total_size,
        })
        .await;

        let result = self
            .send_chunks(&request, reader, &session_id, &file_name)
            .await;
        self.emit(SendEvent::Finished {
            session_id: session_id.clone(),
            success: result.is_ok(),
        })
        .await;

        match result {
            Ok(()) => {
                info!(%session_id, "upload finished");
                SendResult::uploaded(session_id)
            }
            Err(message) => {
                let kind = if total_chunks > 1 {
                    FailureKind::Fatal
                } else {
                    FailureKind::Soft
                };
                warn!(%session_id, ?kind, "upload failed: {message}");
                SendResult::failed(Some(session_id), message, kind)
            }
        }
    }

    async fn send_chunks(
        &self,
        request: &SendRequest,
        mut reader: ChunkReader,
        session_id: &str,
        file_name: &str,
    ) -> Result<(), String> {
        let total_chunks = reader.total_chunks();
        let total_size = reader.file_size();
        let mut bytes_sent: u64 = 0;

        tokio::time::sleep(self.config.startup_delay).await;

        loop {
            let (returned, next) = tokio::task::spawn_blocking(move || {
                let chunk = reader.next_chunk();
                (reader, chunk)
            })
            .await
            .map_err(|e| format!("read task failed: {e}"))?;
            reader = returned;

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(()),
                Err(e) => return Err(format!("failed to read chunk: {e}")),
            };

            if chunk.ordinal > 1 {
                tokio::time::sleep(self.config.inter_chunk_delay).await;
            }

            let meta = ChunkMeta {
                session_id: session_id.to_string(),
                file_name: file_name.to_string(),
                ordinal: chunk.ordinal,
                total_chunks,
                total_size,
                is_last: chunk.is_last(),
            };
            self.deliver(request, &meta, &chunk.data).await?;

            bytes_sent += chunk.size() as u64;
            debug!(
                session_id,
                ordinal = chunk.ordinal,
                total_chunks,
                bytes_sent,
                "chunk sent"
            );
            self.emit(SendEvent::ChunkSent {
                session_id: session_id.to_string(),
                ordinal: chunk.ordinal,
                total_chunks,
                bytes_sent,
            })
            .await;
        }
    }

    /// Sends one chunk. Transport errors and unexpected statuses get one
    /// retry; 401, 403 and 406 fail at once.
    async fn deliver(&self, request: &SendRequest, meta: &ChunkMeta, payload: &[u8]) -> Result<(), String> {
        let mut retried = false;
        loop {
            let outcome = self
                .transport
                .send_chunk(ChunkRequest {
                    url: &request.url,
                    headers: &request.headers,
                    meta,
                    payload,
                })
                .await;

            let reason = match outcome {
                Ok(status) if (200..300).contains(&status) => return Ok(()),
                Ok(status) if REJECTION_STATUSES.contains(&status) => {
                    return Err(format!(
                        "chunk {} of {} rejected with status {status}",
                        meta.ordinal, meta.total_chunks
                    ));
                }
                Ok(status) => format!("status {status}"),
                Err(e) => e.to_string(),
            };

            if retried {
                return Err(format!(
                    "chunk {} of {} failed after retry: {reason}",
                    meta.ordinal, meta.total_chunks
                ));
            }
            warn!(
                session_id = %meta.session_id,
                ordinal = meta.ordinal,
                "chunk send failed ({reason}), retrying in {:?}",
                self.config.retry_delay
            );
            tokio::time::sleep(self.config.retry_delay).await;
            retried = true;
        }
    }

    async fn emit(&self, event: SendEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

async fn open_reader(path: &Path, chunk_size: usize) -> Result<ChunkReader, String> {
    let path_buf = path.to_path_buf();
    let opened = tokio::task::spawn_blocking(move || ChunkReader::new(&path_buf, chunk_size))
        .await
        .map_err(|e| format!("open task failed: {e}"))?;

    opened.map_err(|e| match e {
        TransferError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            format!("file not found: {}", path.display())
        }
        TransferError::NotAFile(_) => format!("not a file: {}", path.display()),
        other => format!("cannot read {}: {other}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::time::Instant;

    use crate::error::TransportError;
    use crate::transport::TransportFuture;

    #[derive(Debug, Clone)]
    struct RecordedChunk {
        meta: ChunkMeta,
        payload: Vec<u8>,
        headers: Vec<(String, String)>,
        at: Instant,
    }

    /// Replays scripted outcomes, then answers 200.
    struct MockTransport {
        script: Mutex<VecDeque<Result<u16, TransportError>>>,
        sent: Mutex<Vec<RecordedChunk>>,
    }

    impl MockTransport {
        fn scripted(outcomes: Vec<Result<u16, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<RecordedChunk> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ChunkTransport for MockTransport {
        fn send_chunk<'a>(&'a self, request: ChunkRequest<'a>) -> TransportFuture<'a> {
            self.sent.lock().unwrap().push(RecordedChunk {
                meta: request.meta.clone(),
                payload: request.payload.to_vec(),
                headers: request.headers.to_vec(),
                at: Instant::now(),
            });
            let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(200));
            Box::pin(async move { outcome })
        }
    }

    fn fast_config(chunk_size: usize) -> SenderConfig {
        SenderConfig {
            chunk_size,
            startup_delay: Duration::ZERO,
            inter_chunk_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn request(path: PathBuf) -> SendRequest {
        SendRequest {
            url: "http://receiver/upload".into(),
            file_path: path,
            ..Default::default()
        }
    }

    fn timeout() -> TransportError {
        TransportError::Timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn sends_chunks_in_order_with_metadata() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..25).collect();
        let path = write_file(&dir, "data.bin", &data);
        let transport = MockTransport::scripted(vec![]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        let mut req = request(path);
        req.headers = vec![("x-token".into(), "abc".into())];
        let result = sender.send(req).await;

        assert!(result.success, "{result:?}");
        assert_eq!(result.message, "uploaded");
        assert_eq!(result.failure, None);
        let id = result.id.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());

        let sent = transport.sent();
        let sizes: Vec<usize> = sent.iter().map(|c| c.payload.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        for (i, chunk) in sent.iter().enumerate() {
            assert_eq!(chunk.meta.ordinal, i as u32 + 1);
            assert_eq!(chunk.meta.total_chunks, 3);
            assert_eq!(chunk.meta.total_size, 25);
            assert_eq!(chunk.meta.session_id, id);
            assert_eq!(chunk.meta.file_name, "data.bin");
            assert_eq!(chunk.headers, vec![("x-token".to_string(), "abc".to_string())]);
        }
        assert!(!sent[1].meta.is_last);
        assert!(sent[2].meta.is_last);
        let joined: Vec<u8> = sent.into_iter().flat_map(|c| c.payload).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn small_file_is_one_last_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "small.txt", b"hello");
        let transport = MockTransport::scripted(vec![]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        assert!(sender.send(request(path)).await.success);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].meta.ordinal, 1);
        assert_eq!(sent[0].meta.total_chunks, 1);
        assert!(sent[0].meta.is_last);
    }

    #[tokio::test]
    async fn bad_input_is_a_soft_failure() {
        let dir = TempDir::new().unwrap();
        let empty = write_file(&dir, "empty.bin", b"");
        let transport = MockTransport::scripted(vec![]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        let cases = [
            SendRequest {
                file_path: empty.clone(),
                ..Default::default()
            },
            request(PathBuf::new()),
            request(dir.path().join("missing.bin")),
            request(empty),
            request(dir.path().to_path_buf()),
        ];
        for case in cases {
            let result = sender.send(case).await;
            assert!(!result.success);
            assert_eq!(result.id, None);
            assert_eq!(result.failure, Some(FailureKind::Soft));
            assert!(!result.message.is_empty());
        }
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn transport_error_is_retried_once() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 15]);
        let transport = MockTransport::scripted(vec![Ok(200), Err(timeout())]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        let result = sender.send(request(path)).await;
        assert!(result.success);
        let ordinals: Vec<u32> = transport.sent().iter().map(|c| c.meta.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn unexpected_status_is_retried_like_transport_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 5]);
        let transport = MockTransport::scripted(vec![Ok(500)]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        assert!(sender.send(request(path)).await.success);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn rejection_statuses_are_not_retried() {
        for status in [401, 403, 406] {
            let dir = TempDir::new().unwrap();
            let path = write_file(&dir, "f.bin", &[1; 5]);
            let transport = MockTransport::scripted(vec![Ok(status)]);
            let sender = ChunkSender::new(transport.clone(), fast_config(10));

            let result = sender.send(request(path)).await;
            assert!(!result.success);
            assert_eq!(result.failure, Some(FailureKind::Soft));
            assert!(result.message.contains(&status.to_string()));
            assert_eq!(transport.sent().len(), 1, "status {status}");
        }
    }

    #[tokio::test]
    async fn multi_chunk_failure_is_fatal_and_stops() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 35]);
        let transport = MockTransport::scripted(vec![Ok(200), Err(timeout()), Err(timeout())]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        let result = sender.send(request(path)).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Fatal));
        assert!(result.id.is_some());
        assert!(result.message.contains("chunk 2 of 4"));

        let ordinals: Vec<u32> = transport.sent().iter().map(|c| c.meta.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn single_chunk_failure_is_soft() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 5]);
        let transport = MockTransport::scripted(vec![Err(timeout()), Ok(502)]);
        let sender = ChunkSender::new(transport.clone(), fast_config(10));

        let result = sender.send(request(path)).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Soft));
        assert!(result.id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_and_retry_delays() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 25]);
        let transport = MockTransport::scripted(vec![Ok(200), Err(timeout())]);
        let config = SenderConfig {
            chunk_size: 10,
            ..Default::default()
        };
        let sender = ChunkSender::new(transport.clone(), config);

        let start = Instant::now();
        assert!(sender.send(request(path)).await.success);

        let offsets: Vec<Duration> = transport.sent().iter().map(|c| c.at - start).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(600),
                Duration::from_millis(1100),
                Duration::from_millis(1650),
            ]
        );
    }

    #[tokio::test]
    async fn emits_progress_events() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", &[1; 15]);
        let (tx, mut rx) = mpsc::channel(16);
        let sender = ChunkSender::new(MockTransport::scripted(vec![]), fast_config(10)).with_events(tx);

        let result = sender.send(request(path)).await;
        drop(sender);
        let id = result.id.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SendEvent::Started {
                    session_id: id.clone(),
                    file_name: "f.bin".into(),
                    total_chunks: 2,
                    total_size: 15,
                },
                SendEvent::ChunkSent {
                    session_id: id.clone(),
                    ordinal: 1,
                    total_chunks: 2,
                    bytes_sent: 10,
                },
                SendEvent::ChunkSent {
                    session_id: id.clone(),
                    ordinal: 2,
                    total_chunks: 2,
                    bytes_sent: 15,
                },
                SendEvent::Finished {
                    session_id: id,
                    success: true,
                },
            ]
        );
    }
}
