//! Transfer collaborator interface.
//!
//! The peer-to-peer protocol itself lives in an external daemon; this
//! module only defines the seam the orchestrator talks through, plus the
//! HTTP client implementation against that daemon. A fetch resolves when
//! the file is fully written to the staging path, and must stop promptly
//! when the cancellation token fires.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::RawResult;

/// Errors from the transfer collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("connection to transfer daemon failed: {0}")]
    Connection(String),
    #[error("transfer timed out")]
    Timeout,
    #[error("peer rejected or dropped the transfer: {0}")]
    Peer(String),
    #[error("writing staged file failed: {0}")]
    Io(String),
    #[error("transfer cancelled")]
    Cancelled,
}

/// Fetches remote files into local staging paths.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Fetch the file a raw result points at into `staging_path`.
    ///
    /// Resolves with the number of bytes written once the file is fully on
    /// disk. Implementations check `cancel` between chunks and return
    /// `TransferError::Cancelled` rather than finishing a doomed download.
    async fn fetch(
        &self,
        raw: &RawResult,
        staging_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError>;
}

/// HTTP client for the external transfer daemon.
///
/// The daemon owns the peer protocol; this client just asks it to stream
/// one file identified by (peer, artist, title, ext).
#[derive(Clone)]
pub struct HttpTransferClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransferClient {
    /// # Arguments
    /// * `base_url` - Base URL of the transfer daemon (e.g. "http://localhost:7710")
    /// * `timeout_secs` - Overall request timeout in seconds
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(e: reqwest::Error) -> TransferError {
        if e.is_timeout() {
            TransferError::Timeout
        } else {
            TransferError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn fetch(
        &self,
        raw: &RawResult,
        staging_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let url = format!("{}/fetch", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("peer", raw.peer.as_str()),
                ("artist", raw.artist.as_str()),
                ("title", raw.title.as_str()),
                ("ext", raw.ext.as_str()),
            ])
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            return Err(TransferError::Peer(format!(
                "transfer daemon returned status {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(staging_path)
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => {
                    debug!("Transfer cancelled after {} bytes: {}", written, raw.label());
                    return Err(TransferError::Cancelled);
                }
            };

            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| TransferError::Io(e.to_string()))?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => return Err(TransferError::Peer(e.to_string())),
                None => break,
            }
        }

        file.flush()
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        debug!("Transfer complete, {} bytes: {}", written, raw.label());
        Ok(written)
    }
}
