use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::RemoteError;

/// Fetches artifact URLs to local files.
#[async_trait]
pub trait Downloader: Send + Sync {
  /// Download `url` to `dest`, creating parent directories. Returns the number of bytes written.
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError>;
}

/// Streams HTTP response bodies to disk.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
  client: Client,
}

impl HttpDownloader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Downloader for HttpDownloader {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
    let response = self.client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: String::new(),
      });
    }

    let io_err = |source| RemoteError::Io {
      path: dest.to_path_buf(),
      source,
    };

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut file = File::create(dest).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await.map_err(io_err)?;
      written += bytes.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    Ok(written)
  }
}
