use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::catalog::{is_http_url, CatalogSource};

pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }

    fn url_for(&self, location: &str) -> String {
        if is_http_url(location) {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl CatalogSource for HttpSource {
    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>> {
        let url = self.url_for(location);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(Some(body.to_vec()))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
