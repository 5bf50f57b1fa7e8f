//! Tavily web search adapter

use crate::agent::collaborators::{WebResult, WebSearchProvider};
use crate::config::WebSearchConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    topic: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<SearchHit> for WebResult {
    fn from(hit: SearchHit) -> Self {
        WebResult {
            title: hit.title.filter(|t| !t.is_empty()).unwrap_or_else(|| "No title".to_string()),
            content: hit
                .content
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "No content".to_string()),
            url: hit.url.unwrap_or_default(),
        }
    }
}

pub struct TavilyClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    topic: String,
}

impl TavilyClient {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "web_search.api_key (or TAVILY_API_KEY) is required".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            topic: config.topic.clone(),
        })
    }

    async fn send(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest { query, max_results, topic: &self.topic })
            .send()
            .await
            .map_err(|e| AppError::SearchProvider { message: format!("request failed: {}", e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SearchProvider {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| AppError::SearchProvider {
            message: format!("unreadable response: {}", e),
        })?;

        Ok(parsed.results.into_iter().take(max_results).map(WebResult::from).collect())
    }
}

#[async_trait]
impl WebSearchProvider for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let started = Instant::now();
        let result = self.send(query, max_results).await;
        metrics::record_provider_call("tavily", started.elapsed().as_secs_f64(), result.is_ok());
        result
    }
}
