//! Boat catalog lookup: resolves a public slug to the content store's
//! internal boat id before a booking request is written.

use crate::config::CatalogConfig;
use crate::errors::AppError;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait BoatCatalog: Send + Sync {
    async fn boat_id_by_slug(&self, slug: &str) -> Result<Option<i64>, AppError>;
}

/// Queries the content store's REST API.
pub struct HttpCatalog {
    client: reqwest::Client,
    config: CatalogConfig,
}

impl HttpCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl BoatCatalog for HttpCatalog {
    async fn boat_id_by_slug(&self, slug: &str) -> Result<Option<i64>, AppError> {
        let url = format!("{}/api/boats", self.config.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .get(&url)
            .query(&[("filters[slug][$eq]", slug), ("fields[0]", "id")]);

        if !self.config.api_token.is_empty() {
            request = request.bearer_auth(&self.config.api_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("catalog lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "catalog lookup failed: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("catalog response malformed: {e}")))?;

        Ok(body["data"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|first| first["id"].as_i64()))
    }
}

/// Fixed slug table for mock mode and tests.
#[derive(Default)]
pub struct StaticCatalog {
    boats: HashMap<String, i64>,
}

impl StaticCatalog {
    pub fn new(boats: HashMap<String, i64>) -> Self {
        Self { boats }
    }
}

#[async_trait]
impl BoatCatalog for StaticCatalog {
    async fn boat_id_by_slug(&self, slug: &str) -> Result<Option<i64>, AppError> {
        Ok(self.boats.get(slug).copied())
    }
}
