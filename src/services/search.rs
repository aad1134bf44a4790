use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ToolError;
use crate::services::retry::{check_status, with_retry, RetryPolicy};

pub const DEFAULT_RESULTS: usize = 10;
pub const MAX_RESULTS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchResult>, ToolError>;
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

/// Google results through the Serper API.
pub struct SerperSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl SerperSearch {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchResult>, ToolError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArgument("Search query is empty".to_string()));
        }

        let num = num_results.clamp(1, MAX_RESULTS);
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({ "q": query, "num": num });
        let (client, url, body, api_key) = (&self.client, url.as_str(), &body, self.api_key.as_str());

        log::info!("Web search: {}", query);
        let response = with_retry(&self.retry, "web search", || async move {
            let response = client
                .post(url)
                .header("X-API-KEY", api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await?;
            let response = check_status(response).await?;
            Ok::<_, ToolError>(response.json::<SerperResponse>().await?)
        })
        .await?;

        Ok(response.organic.into_iter().take(num).collect())
    }
}
