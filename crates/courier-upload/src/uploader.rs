//! HTTP delivery of encoded batches.
//!
//! One call to [`BatchTransport::deliver`] is one delivery attempt: a form
//! POST carrying `crc`, `gzip` and `data_list`, with at most one redirect hop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use crate::codec::{EncodedBatch, GZIP_MARKER};
use crate::errors::UploadError;

/// Header telling the collector not to persist the batch.
pub const DRY_RUN_HEADER: &str = "Dry-Run";

/// Per-attempt request options taken from the live settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Session cookie sent as the `Cookie` header.
    pub cookie: Option<String>,
    /// Send `Dry-Run: true`.
    pub dry_run: bool,
}

/// Successful delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// 2xx status of the final response.
    pub status: u16,
    /// Whether a redirect was followed to get there.
    pub redirected: bool,
}

/// Something that can carry an encoded batch to the collector.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Perform one delivery attempt.
    ///
    /// Non-2xx answers come back as [`UploadError::Response`]; transport
    /// failures as [`UploadError::Connection`].
    async fn deliver(
        &self,
        endpoint: &str,
        batch: &EncodedBatch,
        options: &DeliveryOptions,
    ) -> Result<DeliveryReceipt, UploadError>;
}

/// Timeouts for the HTTP client.
#[derive(Clone, Debug)]
pub struct UploaderConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included.
    pub request_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    /// Build an uploader with automatic redirects disabled.
    pub fn new(config: &UploaderConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UploadError::Connection(format!("client setup: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client. It must not follow redirects on its own.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post_once(
        &self,
        url: &Url,
        batch: &EncodedBatch,
        options: &DeliveryOptions,
    ) -> Result<reqwest::Response, UploadError> {
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(3);
        if let Some(crc) = batch.checksum.as_deref() {
            form.push(("crc", crc));
        }
        form.push(("gzip", GZIP_MARKER));
        form.push(("data_list", batch.data.as_str()));

        let mut request = self.client.post(url.clone()).form(&form);
        if let Some(cookie) = options.cookie.as_deref() {
            request = request.header(COOKIE, cookie);
        }
        if options.dry_run {
            request = request.header(DRY_RUN_HEADER, "true");
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl BatchTransport for HttpUploader {
    #[instrument(skip_all, fields(endpoint = %endpoint, records = batch.record_count))]
    async fn deliver(
        &self,
        endpoint: &str,
        batch: &EncodedBatch,
        options: &DeliveryOptions,
    ) -> Result<DeliveryReceipt, UploadError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| UploadError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let mut redirected = false;

        let response = loop {
            let response = self.post_once(&url, batch, options).await?;
            let status = response.status();
            debug!(status = status.as_u16(), url = %url, "collector responded");

            if redirected || !is_followed_redirect(status) {
                break response;
            }
            match redirect_target(&url, &response)? {
                Some(target) => {
                    info!(from = %url, to = %target, "following redirect");
                    // Drain the redirect body before reusing the connection.
                    if let Err(e) = response.bytes().await {
                        debug!(error = %e, "failed to drain redirect body");
                    }
                    url = target;
                    redirected = true;
                }
                None => break response,
            }
        };

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!(status = status.as_u16(), "batch accepted");
            Ok(DeliveryReceipt {
                status: status.as_u16(),
                redirected,
            })
        } else {
            warn!(status = status.as_u16(), body = %body, "batch rejected");
            Err(UploadError::Response {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Resolve a non-empty `Location` against the request URL.
fn redirect_target(current: &Url, response: &reqwest::Response) -> Result<Option<Url>, UploadError> {
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|e| UploadError::InvalidEndpoint(format!("redirect location: {e}")))?
        .trim();
    if location.is_empty() {
        return Ok(None);
    }
    current
        .join(location)
        .map(Some)
        .map_err(|e| UploadError::InvalidEndpoint(format!("redirect location {location}: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
