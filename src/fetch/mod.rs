use std::io::Read;
use std::time::Instant;

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::{CONTENT_ENCODING, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};
use url::Url;

use crate::telemetry::TelemetryHandle;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to build request: {0}")]
    RequestBuild(#[source] reqwest::Error),
    #[error("request cancelled before completion")]
    Cancelled,
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to decompress response body: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("failed to read response body: {0}")]
    Read(#[source] reqwest::Error),
}

impl FetchError {
    /// Every local, transport, or decode failure maps to the same
    /// internal-error sentinel; the caller never sees a partial status.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// The outcome of a successful exchange: body bytes are always fully
/// decompressed plaintext, whatever the origin server sent.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: Bytes,
    pub status: StatusCode,
}

/// Executes single HTTP request/response cycles with transparent gzip
/// handling and timing telemetry. One instance holds one pooled client
/// and is shared across calls.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        // Decompression happens in `fetch` itself, so payloads the server
        // compresses without negotiation are decoded all the same.
        let client = Client::builder()
            .gzip(false)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Performs exactly one exchange: builds the request, applies the
    /// header entries in order, races the transfer against the caller's
    /// cancellation token, and drains the (possibly gzip-compressed) body
    /// into memory. No retries, no redirect policy beyond the transport
    /// default, no size limit at this layer.
    ///
    /// All telemetry for the call is routed through `telemetry`; exactly
    /// one completion record is emitted per call, whatever the exit path.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        telemetry: &TelemetryHandle,
        method: Method,
        target: Url,
        body: Option<Bytes>,
        headers: &[HeaderMap],
    ) -> Result<FetchResponse, FetchError> {
        let client = self.client.clone();
        let exchange = async move {
            let mut builder = client.request(method, target.clone());
            if let Some(bytes) = body {
                builder = builder.body(bytes);
            }
            let mut request = builder.build().map_err(|err| {
                error!(request_url = %target, err = %err, "error creating http request");
                FetchError::RequestBuild(err)
            })?;
            apply_headers(request.headers_mut(), headers);

            let started = Instant::now();
            info!(request = %target, "started");
            let mut completion = CompletionGuard::new(target.clone(), started);

            // Biased select: an already-expired token wins deterministically
            // and the request is never sent.
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // Token expiry shares the transport failure vocabulary.
                    error!(
                        request_url = %target,
                        err = %FetchError::Cancelled,
                        "error calling web service"
                    );
                    return Err(FetchError::Cancelled);
                }
                result = client.execute(request) => result.map_err(|err| {
                    error!(request_url = %target, err = %err, "error calling web service");
                    FetchError::Transport(err)
                })?,
            };

            let status = response.status();
            completion.status = Some(status);

            let advertised_gzip = response
                .headers()
                .get(CONTENT_ENCODING)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.eq_ignore_ascii_case("gzip"));

            // Consuming the body releases the connection back to the pool
            // on every path from here on.
            let raw = response.bytes().await.map_err(FetchError::Read)?;

            let plaintext = if advertised_gzip || raw.starts_with(GZIP_MAGIC) {
                let mut decoder = GzDecoder::new(raw.as_ref());
                let mut decoded = Vec::new();
                decoder.read_to_end(&mut decoded).map_err(|err| {
                    error!(request_url = %target, err = %err, "error decompressing response of web service");
                    FetchError::Decompress(err)
                })?;
                Bytes::from(decoded)
            } else {
                raw
            };

            completion.error = false;
            Ok(FetchResponse {
                body: plaintext,
                status,
            })
        };

        exchange.with_subscriber(telemetry.dispatch().clone()).await
    }
}

/// Applies every header entry with insert (set) semantics: processed in
/// order, the last write for a given name wins, so repeated names across
/// entries never accumulate beyond the caller's intent.
fn apply_headers(target: &mut HeaderMap, entries: &[HeaderMap]) {
    for entry in entries {
        for (name, value) in entry {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Emits the completion record from `drop`, so exactly one fires per call
/// no matter which path leaves the function.
struct CompletionGuard {
    target: Url,
    started: Instant,
    status: Option<StatusCode>,
    error: bool,
}

impl CompletionGuard {
    fn new(target: Url, started: Instant) -> Self {
        Self {
            target,
            started,
            status: None,
            error: true,
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let status = self
            .status
            .map_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.as_u16(), |s| s.as_u16());
        info!(
            request = %self.target,
            status,
            error = self.error,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "web service call completed"
        );
    }
}
