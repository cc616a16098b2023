//! Writing encoded points to InfluxDB.
//!
//! Two write APIs are supported. The 1.x API takes the line as-is at the
//! configured endpoint. The 2.x API needs an organization, a bucket and a
//! token; it is selected whenever both `INFLUXDB_ORG` and `INFLUXDB_BUCKET`
//! are set. Credentials are looked up again for every write so a rotated
//! token is picked up without a restart.

use crate::core::MetricsSink;
use async_trait::async_trait;
use figment::providers::Env;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("neither INFLUXDB_TOKEN nor INFLUXDB_TOKEN_FILE is set")]
    MissingToken,

    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token file {0} is empty")]
    EmptyTokenFile(PathBuf),

    #[error("invalid database endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("post error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("non-204 response: {status}, body: {body}")]
    Rejected { status: u16, body: String },
}

/// The write API generation selected by the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteProtocol<'a> {
    /// InfluxDB 1.x: post to the configured endpoint.
    Legacy,
    /// InfluxDB 2.x: post to `/api/v2/write` with a token.
    V2 { org: &'a str, bucket: &'a str },
}

/// Database credentials as found in the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub org: Option<String>,
    pub bucket: Option<String>,
}

impl Credentials {
    pub fn protocol(&self) -> WriteProtocol<'_> {
        match (self.org.as_deref(), self.bucket.as_deref()) {
            (Some(org), Some(bucket)) => WriteProtocol::V2 { org, bucket },
            _ => WriteProtocol::Legacy,
        }
    }

    /// Resolves the bearer token, preferring the direct value over the file.
    pub async fn resolve_token(&self) -> Result<String, WriteError> {
        if let Some(token) = self.token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }

        let path = self.token_file.as_ref().ok_or(WriteError::MissingToken)?;
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WriteError::TokenFile {
                path: path.clone(),
                source,
            })?;
        let token = contents.trim();
        if token.is_empty() {
            return Err(WriteError::EmptyTokenFile(path.clone()));
        }
        Ok(token.to_string())
    }
}

/// Supplies credentials for a write attempt.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Reads `INFLUXDB_TOKEN`, `INFLUXDB_TOKEN_FILE`, `INFLUXDB_ORG` and
/// `INFLUXDB_BUCKET` on every call. Empty variables count as unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::default();
        for (key, value) in Env::prefixed("INFLUXDB_").iter() {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str().to_ascii_lowercase().as_str() {
                "token" => credentials.token = Some(value),
                "token_file" => credentials.token_file = Some(PathBuf::from(value)),
                "org" => credentials.org = Some(value),
                "bucket" => credentials.bucket = Some(value),
                _ => {}
            }
        }
        credentials
    }
}

/// A fixed set of credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Credentials);

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}

/// Builds the 2.x write URL from a configured (usually 1.x style) endpoint.
///
/// Everything from the first `/write` path segment on is discarded, so
/// `http://h:8086/write?db=x` becomes
/// `http://h:8086/api/v2/write?org=<org>&bucket=<bucket>`.
pub fn v2_write_url(endpoint: &str, org: &str, bucket: &str) -> Result<Url, WriteError> {
    let trimmed = endpoint.trim_end_matches('/');
    let path_start = trimmed.find("://").map(|i| i + 3).unwrap_or(0);
    let base = match trimmed[path_start..].find("/write") {
        Some(i) => &trimmed[..path_start + i],
        None => trimmed,
    };

    let mut url = Url::parse(&format!("{}/api/v2/write", base)).map_err(|e| {
        WriteError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    })?;
    url.query_pairs_mut()
        .append_pair("org", org)
        .append_pair("bucket", bucket);
    Ok(url)
}

/// Sends lines to InfluxDB over HTTP.
pub struct InfluxWriter {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
}

impl InfluxWriter {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Result<Self, WriteError> {
        Self::with_timeout(credentials, WRITE_TIMEOUT)
    }

    pub fn with_timeout(
        credentials: Arc<dyn CredentialSource>,
        timeout: Duration,
    ) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl MetricsSink for InfluxWriter {
    #[instrument(skip(self, line))]
    async fn write(&self, endpoint: &str, line: &str) -> Result<(), WriteError> {
        let credentials = self.credentials.credentials();
        let request = match credentials.protocol() {
            WriteProtocol::Legacy => {
                debug!("Writing with the 1.x API");
                self.client
                    .post(endpoint)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            }
            WriteProtocol::V2 { org, bucket } => {
                let token = credentials.resolve_token().await?;
                let url = v2_write_url(endpoint, org, bucket)?;
                debug!(url = %url, "Writing with the 2.x API");
                self.client
                    .post(url)
                    .header(AUTHORIZATION, format!("Token {}", token))
                    .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            }
        };

        let response = request.body(line.to_string()).send().await?;
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
