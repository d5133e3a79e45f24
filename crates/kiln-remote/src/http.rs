use std::time::Duration;

use async_trait::async_trait;
use kiln_manifest::TaskStatus;
use reqwest::{Client, Response};
use tracing::{debug, info};
use url::Url;

use crate::backend::{Backend, TaskOutcome};
use crate::error::RemoteError;

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
  /// Base URL every endpoint is resolved against.
  pub base_url: String,
  /// Sent as a bearer token when present.
  pub api_key: Option<String>,
  /// Delay between status polls.
  pub poll_interval: Duration,
}

/// Backend speaking the generation service's task API.
///
/// - `POST {base}/{endpoint}` with the JSON body answers `{ "result": "<task id>" }`
/// - `GET {base}/{endpoint}/{task id}` answers the task document, whose
///   `status` is one of `PENDING`, `IN_PROGRESS`, `SUCCEEDED`, `FAILED`, `CANCELED`
pub struct HttpBackend {
  client: Client,
  base_url: Url,
  api_key: Option<String>,
  poll_interval: Duration,
}

impl HttpBackend {
  pub fn new(config: HttpBackendConfig) -> Result<Self, RemoteError> {
    Self::with_client(Client::new(), config)
  }

  pub fn with_client(client: Client, config: HttpBackendConfig) -> Result<Self, RemoteError> {
    let mut base = config.base_url;
    if !base.ends_with('/') {
      base.push('/');
    }

    Ok(Self {
      client,
      base_url: Url::parse(&base)?,
      api_key: config.api_key,
      poll_interval: config.poll_interval,
    })
  }

  fn endpoint_url(&self, endpoint: &str) -> Result<Url, RemoteError> {
    Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
  }

  fn task_url(&self, endpoint: &str, task_id: &str) -> Result<Url, RemoteError> {
    let endpoint = endpoint.trim_matches('/');
    Ok(self.base_url.join(&format!("{}/{}", endpoint, task_id))?)
  }

  fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.api_key {
      Some(key) => request.bearer_auth(key),
      None => request,
    }
  }

  async fn fetch_task(&self, url: &Url) -> Result<serde_json::Value, RemoteError> {
    let response = self.authorize(self.client.get(url.clone())).send().await?;
    read_json(url, response).await
  }
}

#[async_trait]
impl Backend for HttpBackend {
  async fn submit(&self, endpoint: &str, body: &serde_json::Value) -> Result<String, RemoteError> {
    let url = self.endpoint_url(endpoint)?;
    debug!(url = %url, "submitting task");

    let response = self
      .authorize(self.client.post(url.clone()).json(body))
      .send()
      .await?;
    let payload = read_json(&url, response).await?;

    task_id_from(&payload).ok_or_else(|| RemoteError::InvalidResponse {
      url: url.to_string(),
      message: "response carries no task id".to_string(),
    })
  }

  async fn wait_for_terminal(
    &self,
    endpoint: &str,
    task_id: &str,
  ) -> Result<TaskOutcome, RemoteError> {
    let url = self.task_url(endpoint, task_id)?;
    let mut last_progress = None;

    loop {
      let task = self.fetch_task(&url).await?;
      let status = status_from(&task).ok_or_else(|| RemoteError::InvalidResponse {
        url: url.to_string(),
        message: format!("unrecognized task status: {}", task["status"]),
      })?;

      if status.is_terminal() {
        return Ok(TaskOutcome {
          status,
          response: task,
        });
      }

      let progress = task.get("progress").and_then(|p| p.as_u64());
      if progress.is_some() && progress != last_progress {
        info!(task_id = %task_id, status = %status, progress = progress.unwrap_or(0), "task progress");
        last_progress = progress;
      }

      tokio::time::sleep(self.poll_interval).await;
    }
  }
}

async fn read_json(url: &Url, response: Response) -> Result<serde_json::Value, RemoteError> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(RemoteError::Status {
      url: url.to_string(),
      status: status.as_u16(),
      body,
    });
  }

  let text = response.text().await?;
  serde_json::from_str(&text).map_err(|e| RemoteError::InvalidResponse {
    url: url.to_string(),
    message: e.to_string(),
  })
}

/// Task id of a submission response: `result` or `id`.
fn task_id_from(payload: &serde_json::Value) -> Option<String> {
  ["result", "id", "task_id"]
    .iter()
    .filter_map(|key| payload.get(*key))
    .find_map(|value| match value {
      serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
      serde_json::Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
}

fn status_from(task: &serde_json::Value) -> Option<TaskStatus> {
  task
    .get("status")
    .and_then(|s| s.as_str())
    .and_then(TaskStatus::from_remote)
}
