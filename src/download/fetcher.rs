//! HTTP fetcher implementation
//!
//! This module handles the network side of a download:
//! - Building the HTTP client with the configured user agent and headers
//! - Issuing the GET request for a media URL
//! - Streaming the response body straight to a file
//! - Reporting failures in a form the retry policy can classify

use crate::config::Config;
use crate::url::file_name_for;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Failure of a single download attempt
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {0}")]
    Status(StatusCode),

    /// Connection, timeout, TLS, or body transfer failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Writing the downloaded bytes failed
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The queued entry could not be turned back into a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// HTTP status behind this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// A completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Builds an HTTP client with proper configuration
///
/// The client sends `Name/Version (+ContactURL; ContactEmail)` as its user
/// agent plus every header from the `[headers]` table, and follows redirects
/// (media links commonly bounce to a CDN).
///
/// # Example
///
/// ```no_run
/// use reel_queue::config::load_config;
/// use reel_queue::download::build_http_client;
/// use std::path::Path;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid header '{}'", name),
        }
    }

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .timeout(config.downloader.request_timeout())
        .connect_timeout(config.downloader.connect_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Path a URL is downloaded to inside `dir`
pub fn target_path(dir: &Path, url: &Url) -> PathBuf {
    dir.join(file_name_for(url))
}

/// Attempt-private file the body is streamed into before it is moved to `target`
///
/// Each worker writes its own `.part-<worker>` file, so concurrent downloads
/// of URLs that map to the same name never write to the same file.
pub fn partial_path(target: &Path, worker: usize) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(format!(".part-{}", worker));
    PathBuf::from(name)
}

/// Downloads `url` into `dir`, streaming the body to disk
///
/// The body goes to [`partial_path`] first and is renamed to the final name
/// only after every chunk has been written, so an existing file at the final
/// path is untouched unless the download completes. On any error the partial
/// file is removed.
pub async fn download_to_file(
    client: &Client,
    url: &Url,
    dir: &Path,
    worker: usize,
) -> Result<DownloadedFile, FetchError> {
    let path = target_path(dir, url);
    let partial = partial_path(&path, worker);

    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let bytes = match stream_to_file(response, &partial).await {
        Ok(bytes) => bytes,
        Err(e) => {
            discard_partial(&partial).await;
            return Err(e);
        }
    };

    if let Err(source) = tokio::fs::rename(&partial, &path).await {
        discard_partial(&partial).await;
        return Err(FetchError::Io { path, source });
    }

    Ok(DownloadedFile { path, bytes })
}

async fn stream_to_file(mut response: reqwest::Response, path: &Path) -> Result<u64, FetchError> {
    let io_err = |source: std::io::Error| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut bytes = 0u64;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        bytes += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    Ok(bytes)
}

/// Removes a partially written download, ignoring a missing file
pub async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Could not remove partial file {}: {}", path.display(), e);
        }
    }
}
