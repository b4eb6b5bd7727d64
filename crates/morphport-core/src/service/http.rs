use super::{Category, ModelRef, SchemaSource};
use crate::config::EngineConfig;
use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// `{success, data}` wrapper around every service response.
#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ModelDetail {
    #[serde(default)]
    input_schema: Option<Value>,
}

/// `SchemaSource` over the service's REST endpoints.
#[derive(Clone, Debug)]
pub struct HttpSchemaSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSchemaSource {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build schema service HTTP client")?;
        Ok(Self {
            client,
            base: config.service_url.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("GET {url}: undecodable body"))?;
        if !envelope.success {
            bail!(
                "GET {url} reported failure: {}",
                envelope.message.unwrap_or_else(|| "no message".to_string())
            );
        }
        envelope
            .data
            .ok_or_else(|| anyhow!("GET {url}: success without data"))
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid endpoint '{path}'"))
    }
}

#[async_trait]
impl SchemaSource for HttpSchemaSource {
    #[tracing::instrument(skip(self))]
    async fn categories(&self) -> anyhow::Result<Vec<Category>> {
        self.get(self.endpoint("categories")?).await
    }

    #[tracing::instrument(skip(self))]
    async fn models(&self, category: &str) -> anyhow::Result<Vec<ModelRef>> {
        let mut url = self.endpoint("models")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Service URL cannot carry a path"))?
            .push(category);
        self.get(url).await
    }

    #[tracing::instrument(skip(self))]
    async fn model_schema(&self, model_id: &str) -> anyhow::Result<Option<Value>> {
        let mut url = self.endpoint("model")?;
        url.query_pairs_mut().append_pair("model_id", model_id);
        let detail: ModelDetail = self.get(url).await?;
        Ok(detail.input_schema.filter(|schema| !schema.is_null()))
    }
}
