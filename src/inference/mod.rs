use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::ProcessRequest;

const PROCESS_PATH: &str = "/process";

/// HTTP client for the inference backend.
///
/// The backend is opaque: it receives the whole conversation and answers with
/// a blank-line-delimited `data:` event stream.
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    process_url: String,
    connect_retries: u32,
    retry_backoff: Duration,
}

impl InferenceClient {
    pub fn new(base_url: &str, connect_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            process_url: format!("{}{PROCESS_PATH}", base_url.trim_end_matches('/')),
            connect_retries,
            retry_backoff,
        }
    }

    pub fn process_url(&self) -> &str {
        &self.process_url
    }

    /// Opens the event stream for one turn.
    ///
    /// Transport failures and 5xx answers are retried up to `connect_retries`
    /// times with a linear backoff; only the HTTP call is repeated, nothing
    /// already persisted is.
    pub async fn open_stream(
        &self,
        request: &ProcessRequest,
    ) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, AppError> {
        let mut attempt = 0;
        loop {
            let outcome = self.http.post(&self.process_url).json(request).send().await;

            let retryable = match &outcome {
                Ok(resp) => resp.status().is_server_error(),
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if retryable && attempt < self.connect_retries {
                attempt += 1;
                warn!(
                    "Inference backend not ready for conversation {} (attempt {attempt}), retrying",
                    request.id
                );
                tokio::time::sleep(self.retry_backoff * attempt).await;
                continue;
            }

            let response = outcome
                .map_err(|e| AppError::backend(&self.process_url, e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::backend(&self.process_url, format!("status {status}")));
            }

            debug!("Inference stream open for conversation {}", request.id);
            return Ok(response.bytes_stream().boxed());
        }
    }
}
