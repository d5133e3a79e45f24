//! Kiln Remote
//!
//! The engine's view of the remote generation service:
//!
//! - [`Backend`]: submit a task to an endpoint and wait until it reaches a
//!   terminal status.
//! - [`Downloader`]: stream an artifact URL to a local file.
//!
//! [`HttpBackend`] and [`HttpDownloader`] are the production implementations.
//! Neither retries; a failed request surfaces as a [`RemoteError`].

mod backend;
mod download;
mod error;
mod http;

pub use backend::{Backend, TaskOutcome};
pub use download::{Downloader, HttpDownloader};
pub use error::RemoteError;
pub use http::{HttpBackend, HttpBackendConfig};
