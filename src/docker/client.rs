//! A minimal Docker Engine API client.
//!
//! The engine normally listens on a local unix socket. Requests on the socket
//! are plain HTTP/1.0 so the engine closes the connection after answering and
//! the whole response can be read to EOF. TCP endpoints go through `reqwest`.

use super::{ContainerSummary, DockerError, DockerStats};
use crate::core::StatsSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, instrument};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a Docker engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Http(String),
}

/// Parses endpoints such as `unix:///var/run/docker.sock`,
/// `/var/run/docker.sock`, `tcp://127.0.0.1:2375` or `http://host:2375`.
pub fn parse_endpoint(endpoint: &str) -> Result<Endpoint, DockerError> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        Ok(Endpoint::Unix(PathBuf::from(path)))
    } else if endpoint.starts_with('/') {
        Ok(Endpoint::Unix(PathBuf::from(endpoint)))
    } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
        Ok(Endpoint::Http(format!("http://{}", addr.trim_end_matches('/'))))
    } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(Endpoint::Http(endpoint.trim_end_matches('/').to_string()))
    } else {
        Err(DockerError::InvalidEndpoint(endpoint.to_string()))
    }
}

#[derive(Debug, Clone)]
enum Transport {
    Unix(PathBuf),
    Http { client: reqwest::Client, base: String },
}

/// Talks to a single Docker engine.
#[derive(Debug, Clone)]
pub struct DockerClient {
    transport: Transport,
    timeout: Duration,
}

impl DockerClient {
    /// Creates a client for an endpoint accepted by [`parse_endpoint`].
    pub fn new(endpoint: &str) -> Result<Self, DockerError> {
        let transport = match parse_endpoint(endpoint)? {
            Endpoint::Unix(path) => Transport::Unix(path),
            Endpoint::Http(base) => Transport::Http {
                client: reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?,
                base,
            },
        };

        Ok(Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DockerError> {
        let body = match &self.transport {
            Transport::Unix(socket) => {
                tokio::time::timeout(self.timeout, unix_get(socket, path))
                    .await
                    .map_err(|_| DockerError::Timeout(self.timeout))??
            }
            Transport::Http { client, base } => {
                let response = client
                    .get(format!("{}{}", base, path))
                    .timeout(self.timeout)
                    .send()
                    .await?;
                let status = response.status();
                let body = response.bytes().await?.to_vec();
                if !status.is_success() {
                    return Err(DockerError::Status {
                        status: status.as_u16(),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
                body
            }
        };
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl StatsSource for DockerClient {
    #[instrument(skip(self))]
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
        self.get_json("/containers/json").await
    }

    #[instrument(skip(self))]
    async fn container_stats(&self, id: &str) -> Result<DockerStats, DockerError> {
        self.get_json(&format!("/containers/{}/stats?stream=false", id))
            .await
    }
}

/// Performs a GET over the unix socket and returns the body of a 2xx answer.
async fn unix_get(socket: &Path, path: &str) -> Result<Vec<u8>, DockerError> {
    let mut stream = UnixStream::connect(socket)
        .await
        .map_err(|source| DockerError::Connect {
            path: socket.display().to_string(),
            source,
        })?;

    let request = format!("GET {} HTTP/1.0\r\nHost: localhost\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    debug!(path, bytes = raw.len(), "Read docker response");

    let (status, body) = parse_response(&raw)?;
    if !(200..300).contains(&status) {
        return Err(DockerError::Status {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body)
}

/// Splits a raw HTTP/1.x response into its status code and decoded body.
fn parse_response(raw: &[u8]) -> Result<(u16, Vec<u8>), DockerError> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| DockerError::MalformedResponse("missing header terminator".into()))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let body = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            DockerError::MalformedResponse(format!("bad status line: {:?}", status_line))
        })?;

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.trim().eq_ignore_ascii_case("chunked")
        })
    });

    let body = if chunked {
        decode_chunked(body)?
    } else {
        body.to_vec()
    };
    Ok((status, body))
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, DockerError> {
    let mut out = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| DockerError::MalformedResponse("truncated chunk header".into()))?;
        let size_field = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_field.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| {
            DockerError::MalformedResponse(format!("bad chunk size: {:?}", size_hex))
        })?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if data.len() < size {
            return Err(DockerError::MalformedResponse("truncated chunk".into()));
        }
        out.extend_from_slice(&data[..size]);
        data = data.get(size + 2..).unwrap_or_default();
    }
}
