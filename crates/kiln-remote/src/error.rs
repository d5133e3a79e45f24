use std::path::PathBuf;

use thiserror::Error;

/// Errors talking to the remote service.
#[derive(Debug, Error)]
pub enum RemoteError {
  /// HTTP transport failed.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The service answered with a non-success status.
  #[error("{url} returned {status}: {body}")]
  Status {
    url: String,
    status: u16,
    body: String,
  },

  /// The service answered with something we cannot interpret.
  #[error("invalid response from {url}: {message}")]
  InvalidResponse { url: String, message: String },

  #[error("invalid url: {0}")]
  Url(#[from] url::ParseError),

  /// Writing a downloaded artifact failed.
  #[error("failed to write {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
