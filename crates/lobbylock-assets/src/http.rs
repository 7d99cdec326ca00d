//! REST signing client.
//!
//! Asks the `LobbyLock` API for a signed URL per asset:
//! `GET {base_url}/documents/{documentId}/assets/signed-url?key={key}`,
//! answered with `{"url": "..."}`. Rate-limited and 5xx responses are retried
//! with backoff; auth and not-found answers are returned immediately.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SigningError;
use crate::key::StorageKey;
use crate::signer::AssetSigner;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Configuration for [`HttpSigner`].
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// API base URL. Falls back to `LOBBYLOCK_API_URL`.
    pub base_url: String,
    /// Session bearer token. Falls back to `LOBBYLOCK_TOKEN`.
    pub token: String,
    /// Per-request timeout. Default: 10 seconds.
    pub timeout: Duration,
    /// Retries after the first attempt. Default: 2.
    pub max_retries: u32,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Signs asset keys through the `LobbyLock` REST API.
#[derive(Debug, Clone)]
pub struct HttpSigner {
    base_url: String,
    token: String,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl HttpSigner {
    /// Create a signer from a token, reading the base URL from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Config`] if no token is available.
    pub fn new(token: String) -> Result<Self, SigningError> {
        Self::with_config(SignerConfig {
            token,
            ..Default::default()
        })
    }

    /// Create a signer with full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Config`] if no token is available, or
    /// [`SigningError::Network`] if the HTTP client cannot be built.
    #[allow(clippy::needless_pass_by_value)]
    pub fn with_config(cfg: SignerConfig) -> Result<Self, SigningError> {
        let token = first_non_empty(&[
            &cfg.token,
            &std::env::var("LOBBYLOCK_TOKEN").unwrap_or_default(),
        ]);
        if token.is_empty() {
            return Err(SigningError::Config(
                "missing token: set LOBBYLOCK_TOKEN or pass token in config".to_owned(),
            ));
        }

        let base_url = first_non_empty(&[
            &cfg.base_url,
            &std::env::var("LOBBYLOCK_API_URL").unwrap_or_default(),
            DEFAULT_BASE_URL,
        ])
        .trim_end_matches('/')
        .to_owned();

        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lobbylock-assets/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SigningError::Network)?;

        Ok(Self {
            base_url,
            token,
            max_retries: cfg.max_retries,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn signed_url_endpoint(&self, document_id: &str, key: &StorageKey) -> String {
        format!(
            "{}/documents/{}/assets/signed-url?key={}",
            self.base_url,
            urlencoding::encode(document_id),
            urlencoding::encode(key.as_str())
        )
    }

    async fn request(&self, document_id: &str, key: &StorageKey) -> Result<String, SigningError> {
        let url = self.signed_url_endpoint(document_id, key);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            let req = self.client.get(&url).bearer_auth(&self.token);

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let text = resp.text().await.map_err(SigningError::Network)?;
                        let body: SignedUrlResponse = serde_json::from_str(&text)?;
                        return Ok(body.url);
                    }

                    let error_text = resp.text().await.unwrap_or_default();
                    let msg = serde_json::from_str::<ApiErrorBody>(&error_text)
                        .ok()
                        .and_then(|b| b.error.and_then(|e| e.message).or(b.message))
                        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(SigningError::Unauthorized(msg));
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(SigningError::NotFound {
                            document_id: document_id.to_owned(),
                            key: key.to_string(),
                        });
                    }

                    last_err = Some(SigningError::Api {
                        status_code: status.as_u16(),
                        message: msg,
                    });

                    if attempt < self.max_retries && is_retryable(status) {
                        warn!(%key, status = status.as_u16(), attempt, "retrying signing request");
                        sleep_with_jitter(attempt).await;
                        continue;
                    }
                }
                Err(e) => {
                    last_err = Some(if e.is_timeout() {
                        SigningError::Timeout
                    } else {
                        SigningError::Network(e)
                    });

                    if attempt < self.max_retries {
                        warn!(%key, attempt, "retrying signing request after transport error");
                        sleep_with_jitter(attempt).await;
                        continue;
                    }
                }
            }

            break;
        }

        Err(last_err.unwrap_or(SigningError::Api {
            status_code: 0,
            message: "unknown error".to_owned(),
        }))
    }
}

#[async_trait::async_trait]
impl AssetSigner for HttpSigner {
    async fn sign(&self, document_id: &str, key: &StorageKey) -> Result<String, SigningError> {
        debug!(document_id, %key, "requesting signed url");
        self.request(document_id, key).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

async fn sleep_with_jitter(attempt: u32) {
    #[allow(clippy::cast_possible_truncation)]
    let base = (RETRY_BASE_DELAY.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
    let jitter = base.saturating_mul(u64::from(jitter_permille())) / 1000 * 3 / 10;
    tokio::time::sleep(Duration::from_millis(base.saturating_add(jitter))).await;
}

/// Pseudo-random value in `[0, 1000)` from the clock's sub-second nanos.
fn jitter_permille() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        % 1000
}

fn first_non_empty(vals: &[&str]) -> String {
    vals.iter()
        .find(|v| !v.is_empty())
        .map(|v| (*v).to_owned())
        .unwrap_or_default()
}
