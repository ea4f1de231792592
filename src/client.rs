//! Backend API client.
//!
//! `ViewerApi` is the seam the feed store and dashboard depend on; the
//! production implementation talks to the codemem HTTP server with reqwest,
//! tests plug in in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::feed::cursor::{Page, RawPage};
use crate::feed::SESSION_SUMMARY_KIND;
use crate::settings::ConfigPayload;
use crate::sync::SyncStatusPayload;

/// Non-2xx responses and transport failures, all treated alike by callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{url}: {status} {text}")]
    Status {
        url: String,
        status: StatusCode,
        text: String,
    },
    #[error("{url}: request failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url}: invalid response body: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
pub trait ViewerApi: Send + Sync {
    async fn memories_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page>;
    async fn summaries_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page>;
    async fn stats(&self) -> Result<Value>;
    async fn usage(&self, project: &str) -> Result<Value>;
    async fn session(&self, project: &str) -> Result<Value>;
    async fn raw_events(&self, project: &str) -> Result<Value>;
    async fn sync_status(&self, include_diagnostics: bool) -> Result<SyncStatusPayload>;
    async fn pairing(&self) -> Result<Value>;
    async fn config(&self) -> Result<ConfigPayload>;
    async fn save_config(&self, payload: &Value) -> Result<()>;
    async fn trigger_sync(&self, address: Option<&str>) -> Result<()>;
    async fn projects(&self) -> Result<Vec<String>>;
}

pub struct HttpViewerApi {
    base_url: String,
    client: Client,
}

impl HttpViewerApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(url: &str, resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            url: url.to_string(),
            status,
            text,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        let resp = Self::check(&url, resp).await?;
        let body = resp
            .json::<T>()
            .await
            .map_err(|source| ApiError::Decode { url, source })?;
        Ok(body)
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<()> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, resp).await?;
        Ok(())
    }

    fn page_query(project: &str, limit: u64, offset: u64) -> [(&'static str, String); 3] {
        [
            ("project", project.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]
    }

    fn project_query(project: &str) -> [(&'static str, String); 1] {
        [("project", project.to_string())]
    }
}

#[derive(serde::Deserialize)]
struct ProjectsPayload {
    #[serde(default)]
    projects: Vec<String>,
}

#[async_trait]
impl ViewerApi for HttpViewerApi {
    async fn memories_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page> {
        let raw: RawPage = self
            .get_json("/api/memories", &Self::page_query(project, limit, offset))
            .await?;
        Ok(raw.into_page(None))
    }

    async fn summaries_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page> {
        let raw: RawPage = self
            .get_json("/api/summaries", &Self::page_query(project, limit, offset))
            .await?;
        Ok(raw.into_page(Some(SESSION_SUMMARY_KIND)))
    }

    async fn stats(&self) -> Result<Value> {
        self.get_json("/api/stats", &[]).await
    }

    async fn usage(&self, project: &str) -> Result<Value> {
        self.get_json("/api/usage", &Self::project_query(project)).await
    }

    async fn session(&self, project: &str) -> Result<Value> {
        self.get_json("/api/session", &Self::project_query(project)).await
    }

    async fn raw_events(&self, project: &str) -> Result<Value> {
        self.get_json("/api/raw-events", &Self::project_query(project)).await
    }

    async fn sync_status(&self, include_diagnostics: bool) -> Result<SyncStatusPayload> {
        let mut query = Vec::with_capacity(1);
        if include_diagnostics {
            query.push(("includeDiagnostics", "1".to_string()));
        }
        self.get_json("/api/sync/status", &query).await
    }

    async fn pairing(&self) -> Result<Value> {
        self.get_json("/api/sync/pairing", &[("includeDiagnostics", "1".to_string())])
            .await
    }

    async fn config(&self) -> Result<ConfigPayload> {
        self.get_json("/api/config", &[]).await
    }

    async fn save_config(&self, payload: &Value) -> Result<()> {
        self.post_json("/api/config", payload).await
    }

    async fn trigger_sync(&self, address: Option<&str>) -> Result<()> {
        let payload = match address.filter(|a| !a.is_empty()) {
            Some(address) => json!({ "address": address }),
            None => json!({}),
        };
        self.post_json("/api/sync/run", &payload).await
    }

    async fn projects(&self) -> Result<Vec<String>> {
        let payload: ProjectsPayload = self.get_json("/api/projects", &[]).await?;
        Ok(payload.projects)
    }
}
