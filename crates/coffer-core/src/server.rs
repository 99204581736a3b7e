//! Auth-server transport.
//!
//! Every call returns the `results` payload of the server's reply
//! envelope; non-zero status codes become typed [`LoginError`] values
//! before the caller ever sees them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use coffer_crypto::codec::b64_opt;

use crate::error::{LoginError, OtpChallenge, Result};
use crate::types::ServerMethod;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server status codes inside the reply envelope.
const STATUS_OK: i64 = 0;
const STATUS_NO_ACCOUNT: i64 = 2;
const STATUS_INVALID_PASSWORD: i64 = 3;
const STATUS_INVALID_PIN: i64 = 4;
const STATUS_INVALID_ANSWERS: i64 = 5;
const STATUS_OTP_REQUIRED: i64 = 10;

/// The transport the login engine talks through. Implemented over HTTP in
/// production and by scripted fakes in tests.
#[async_trait]
pub trait LoginFetch: Send + Sync {
    /// Send a request and return the reply's `results` payload.
    ///
    /// `timeout` overrides the transport default where a caller needs a
    /// different budget (the messages endpoint).
    async fn fetch(
        &self,
        method: ServerMethod,
        path: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value>;
}

/// HTTP implementation of [`LoginFetch`].
pub struct HttpAuthServer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAuthServer {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| LoginError::Network(err.to_string()))?;
        Ok(HttpAuthServer {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl LoginFetch for HttpAuthServer {
    async fn fetch(
        &self,
        method: ServerMethod,
        path: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, ?method, "login server request");

        let mut request = match method {
            ServerMethod::Post => self.client.post(&url),
            ServerMethod::Delete => self.client.delete(&url),
        }
        .header("Authorization", format!("Token {}", self.api_key))
        .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let http_status = response.status().as_u16();
        let envelope: ReplyEnvelope = response
            .json()
            .await
            .map_err(|err| LoginError::Protocol(format!("malformed reply envelope: {err}")))?;
        parse_reply(http_status, envelope)
    }
}

#[derive(Deserialize)]
struct ReplyEnvelope {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    results: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct OtpResults {
    #[serde(with = "b64_opt")]
    login_id: Option<Vec<u8>>,
    voucher_id: Option<String>,
    #[serde(with = "b64_opt")]
    voucher_auth: Option<Vec<u8>>,
    otp_reset_token: Option<String>,
}

/// Map a reply envelope to its results or a typed error.
fn parse_reply(http_status: u16, envelope: ReplyEnvelope) -> Result<serde_json::Value> {
    match envelope.status_code {
        STATUS_OK => Ok(envelope.results),
        STATUS_NO_ACCOUNT => Err(LoginError::Username),
        STATUS_INVALID_PASSWORD => Err(LoginError::Password),
        STATUS_INVALID_PIN => Err(LoginError::Pin2),
        STATUS_INVALID_ANSWERS => Err(LoginError::Recovery2),
        STATUS_OTP_REQUIRED => {
            let otp: OtpResults = serde_json::from_value(envelope.results).unwrap_or_default();
            Err(LoginError::Otp(OtpChallenge {
                login_id: otp.login_id,
                voucher_id: otp.voucher_id,
                voucher_auth: otp.voucher_auth,
                reset_token: otp.otp_reset_token,
            }))
        }
        code => Err(LoginError::Server(
            http_status,
            envelope
                .message
                .unwrap_or_else(|| format!("status code {code}")),
        )),
    }
}
