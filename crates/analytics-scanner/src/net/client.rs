use crate::errors::Result;
use crate::types::MetadataRecord;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const REGISTER_API: &str = "/api/v1/register";
pub const SCANNER_ERROR_API: &str = "/api/v1/scanner-error";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Could not send POST request to URL {url}. Error: {reason}")]
    Transport { url: String, reason: String },

    #[error("POST request to URL {url} returned non okay status code {status}")]
    Server { url: String, status: u16 },

    #[error("invalid JSON in response from URL {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Body of `POST /api/v1/scanner-error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    #[serde(rename = "image-name")]
    pub image_name: String,
    #[serde(rename = "email-ids", skip_serializing_if = "Option::is_none")]
    pub email_ids: Option<String>,
    pub error: Vec<String>,
}

/// The two calls the scanner makes against the analytics server.
/// One attempt each; callers decide what a failure means.
pub trait AnalyticsApi {
    /// 2xx body, parsed as JSON and otherwise untouched.
    fn register(
        &self,
        server: &str,
        metadata: &MetadataRecord,
    ) -> std::result::Result<Value, RegistrationError>;

    fn report_error(
        &self,
        server: &str,
        report: &ErrorReport,
    ) -> std::result::Result<(), RegistrationError>;
}

/// Blocking HTTP client with rustls. Default reqwest timeouts, no retries.
#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    http: Client,
}

impl AnalyticsClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("analytics-scanner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// Use a preconfigured reqwest client (proxy settings, TLS roots, ...).
    pub fn with_http(http: Client) -> Self {
        Self { http }
    }

    fn post(
        &self,
        server: &str,
        api: &str,
        body: &impl Serialize,
    ) -> std::result::Result<(String, String), RegistrationError> {
        let url = endpoint(server, api)?;
        let url_str = url.to_string();
        tracing::debug!(url = %url_str, "POST");

        let payload = serde_json::to_vec(body).map_err(|e| RegistrationError::Decode {
            url: url_str.clone(),
            reason: e.to_string(),
        })?;

        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .map_err(|e| RegistrationError::Transport {
                url: url_str.clone(),
                reason: error_chain(&e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistrationError::Server {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let text = resp.text().map_err(|e| RegistrationError::Transport {
            url: url_str.clone(),
            reason: error_chain(&e),
        })?;
        Ok((url_str, text))
    }
}

impl AnalyticsApi for AnalyticsClient {
    fn register(
        &self,
        server: &str,
        metadata: &MetadataRecord,
    ) -> std::result::Result<Value, RegistrationError> {
        let (url, text) = self.post(server, REGISTER_API, metadata)?;
        serde_json::from_str(&text).map_err(|e| RegistrationError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    fn report_error(
        &self,
        server: &str,
        report: &ErrorReport,
    ) -> std::result::Result<(), RegistrationError> {
        self.post(server, SCANNER_ERROR_API, report).map(|_| ())
    }
}

/// `server` + absolute `api` path; any path on `server` is replaced.
pub fn endpoint(server: &str, api: &str) -> std::result::Result<Url, RegistrationError> {
    let invalid = |reason: String| RegistrationError::InvalidUrl {
        url: server.to_string(),
        reason,
    };
    let base = Url::parse(server.trim()).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(invalid("not a base URL".into()));
    }
    base.join(api).map_err(|e| invalid(e.to_string()))
}

/// reqwest's Display stops at the outermost layer; walk the sources so
/// "connection refused" makes it into the report.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(inner) = cur {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        cur = inner.source();
    }
    out
}
