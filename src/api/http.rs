#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

use crate::api::{TaskBackend, TaskBatch};
use crate::config::ServerConfig;
use crate::error::TasklistError;
use crate::task::model::{Task, TaskPatch};
use crate::task::user::{self, User};

/// REST client for the PHP backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    tasks_url: Url,
    session_url: Url,
    users_url: Url,
}

impl HttpBackend {
    pub fn new(cfg: &ServerConfig) -> Result<Self, TasklistError> {
        let cfg = cfg.resolved();
        let base = Url::parse(&cfg.base_url).map_err(|e| {
            TasklistError::Config(format!("invalid server.base_url '{}': {e}", cfg.base_url))
        })?;
        let join = |path: &str| {
            base.join(path.trim_start_matches('/')).map_err(|e| {
                TasklistError::Config(format!("invalid endpoint path '{path}': {e}"))
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if !cfg.cookie.trim().is_empty() {
            let value = HeaderValue::from_str(cfg.cookie.trim())
                .map_err(|e| TasklistError::Config(format!("invalid server.cookie: {e}")))?;
            headers.insert(header::COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .user_agent(concat!("tasklist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TasklistError::Other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            tasks_url: join(&cfg.tasks_path)?,
            session_url: join(&cfg.session_path)?,
            users_url: join(&cfg.users_path)?,
        })
    }

    #[must_use]
    pub fn tasks_url(&self) -> &Url {
        &self.tasks_url
    }

    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<&TaskBatch<'_>>,
    ) -> Result<Vec<u8>, TasklistError> {
        tracing::debug!(%method, %url, "sending request");
        let mut req = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| TasklistError::Transport {
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%method, %url, %status, "request rejected");
            return Err(TasklistError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| TasklistError::Transport {
            endpoint: url.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;
        tracing::trace!(%method, %url, len = bytes.len(), "response received");
        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, TasklistError> {
        let body = self.request(Method::GET, url, None).await?;
        decode(url, &body)
    }
}

fn decode<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T, TasklistError> {
    serde_json::from_slice(body).map_err(|e| protocol(url, e))
}

fn protocol(url: &Url, err: impl std::fmt::Display) -> TasklistError {
    TasklistError::Protocol {
        endpoint: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, TasklistError> {
        self.get_json(&self.tasks_url).await
    }

    async fn fetch_session(&self) -> Result<Option<User>, TasklistError> {
        let value: serde_json::Value = self.get_json(&self.session_url).await?;
        user::session_from_value(value).map_err(|e| protocol(&self.session_url, e))
    }

    async fn fetch_users(&self) -> Result<Vec<User>, TasklistError> {
        self.get_json(&self.users_url).await
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<Vec<TaskPatch>, TasklistError> {
        let body = self
            .request(Method::POST, &self.tasks_url, Some(&TaskBatch { todos: tasks }))
            .await?;
        let value: serde_json::Value = decode(&self.tasks_url, &body)?;
        if !value.is_array() {
            return Err(protocol(&self.tasks_url, "expected a JSON array of tasks"));
        }
        serde_json::from_value(value).map_err(|e| protocol(&self.tasks_url, e))
    }

    async fn delete_tasks(&self, tasks: &[Task]) -> Result<(), TasklistError> {
        // The acknowledgement body carries nothing we use.
        self.request(Method::DELETE, &self.tasks_url, Some(&TaskBatch { todos: tasks }))
            .await?;
        Ok(())
    }
}
