use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use formic_core::errors::LoadError;
use formic_core::schema::SchemaFragment;

/// Fetches the schema fragment a reference-type composite points at.
/// The engine only ever sees success or a `LoadError`; transport details
/// stay behind this seam.
#[async_trait]
pub trait FragmentLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<SchemaFragment, LoadError>;
}

/// HTTP loader. Absolute sources are fetched as-is; relative sources are
/// resolved against the configured base URL.
pub struct HttpLoader {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Some(base_url.into()),
        }
    }

    fn resolve(&self, source: &str) -> Result<String, LoadError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(source.to_string());
        }
        match &self.base_url {
            Some(base) => Ok(format!("{}/{}", base.trim_end_matches('/'), source)),
            None => Err(LoadError::Malformed(format!(
                "relative source {source:?} with no base url"
            ))),
        }
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentLoader for HttpLoader {
    async fn load(&self, source: &str) -> Result<SchemaFragment, LoadError> {
        let url = self.resolve(source)?;
        let response = self
            .client
            .get(&url)
            .query(&[("live", "1")])
            .send()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoadError::from_status(status.as_u16(), body));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| LoadError::Malformed(e.to_string()))?;
        SchemaFragment::from_value(raw).map_err(|e| LoadError::Malformed(e.to_string()))
    }
}

/// In-memory loader for tests and embedded schemas.
#[derive(Default)]
pub struct StaticLoader {
    fragments: HashMap<String, SchemaFragment>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, fragment: SchemaFragment) {
        self.fragments.insert(source.into(), fragment);
    }
}

#[async_trait]
impl FragmentLoader for StaticLoader {
    async fn load(&self, source: &str) -> Result<SchemaFragment, LoadError> {
        self.fragments
            .get(source)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(source.to_string()))
    }
}
