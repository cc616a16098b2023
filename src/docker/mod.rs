//! Container runtime statistics.
//!
//! `client` talks to the Docker Engine API over its unix socket (or a plain
//! HTTP address), `types` holds the subset of the API payloads that the
//! collector consumes.

pub mod client;
pub mod types;

use thiserror::Error;

pub use client::{parse_endpoint, DockerClient, Endpoint};
pub use types::{ContainerSummary, DockerStats};

/// The endpoint used when a task does not configure one.
pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("unsupported docker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to connect to docker socket {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("docker socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed docker response: {0}")]
    MalformedResponse(String),

    #[error("docker API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode docker response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("docker HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}
