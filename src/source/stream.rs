use super::types::{Record, SourceError};
use super::{RecordSource, RecordStream};

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Creates a bounded in-process source plus the sender that feeds it.
///
/// The receiver outlives individual connections, so a reconnect resumes where the
/// previous stream stopped. The source ends once every sender is dropped.
pub fn channel_source(capacity: usize) -> (mpsc::Sender<Record>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        tx,
        ChannelSource {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

pub struct ChannelSource {
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn connect(&self) -> Result<Box<dyn RecordStream>, SourceError> {
        Ok(Box::new(ChannelStream {
            rx: self.rx.clone(),
        }))
    }
}

struct ChannelStream {
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
}

#[async_trait]
impl RecordStream for ChannelStream {
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Reads a long-lived HTTP response carrying one JSON record per line.
///
/// Blank keep-alive lines are ignored and lines that are not records are skipped. The
/// feed is unbounded, so the end of the body is reported as a disconnect.
pub struct HttpStreamSource {
    url: String,
    client: reqwest::Client,
}

impl HttpStreamSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SourceError::Fatal(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl RecordSource for HttpStreamSource {
    async fn connect(&self) -> Result<Box<dyn RecordStream>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Fatal(format!(
                "stream {} rejected the connection: {}",
                self.url, status
            )));
        }
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "stream {} returned {}",
                self.url, status
            )));
        }

        tracing::info!("Connected to record stream {}", self.url);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(Box::new(LineStream {
            body,
            pending: Vec::new(),
        }))
    }
}

struct LineStream {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    pending: Vec<u8>,
}

impl LineStream {
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

#[async_trait]
impl RecordStream for LineStream {
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(record) = parse_line(&line) {
                    return Ok(Some(record));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(SourceError::Transport(e.to_string())),
                None => {
                    return Err(SourceError::Disconnected(
                        "record stream closed by peer".to_string(),
                    ))
                }
            }
        }
    }
}

/// `None` for keep-alive lines and for lines that do not parse as a record.
pub fn parse_line(line: &[u8]) -> Option<Record> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Record>(text) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Skipping unparsable stream line ({} bytes): {}", text.len(), e);
            None
        }
    }
}
