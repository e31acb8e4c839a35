//! Manifest download and decoding
//!
//! A manifest URL may hold any number of YAML (or JSON) documents. Empty
//! documents are skipped; every other document must name its `apiVersion`,
//! `kind` and `metadata.name`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{KubeError, Result};

/// One decoded Kubernetes object
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// Full object as it will be sent to the API server
    pub object: Value,
}

impl ManifestDocument {
    /// Validate a decoded object
    pub fn from_value(object: Value) -> Result<Self> {
        let field = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let api_version = field("/apiVersion")
            .ok_or_else(|| KubeError::InvalidManifest("document has no apiVersion".to_string()))?;
        let kind = field("/kind")
            .ok_or_else(|| KubeError::InvalidManifest("document has no kind".to_string()))?;
        let name = field("/metadata/name").ok_or_else(|| {
            KubeError::InvalidManifest(format!("{kind} document has no metadata.name"))
        })?;
        let namespace = field("/metadata/namespace");

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            object,
        })
    }

    /// Set the namespace, in the object as well
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = self
            .object
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
        {
            metadata.insert("namespace".to_string(), Value::from(namespace));
        }
        self.namespace = Some(namespace.to_string());
    }

    /// `Kind/name` or `Kind/namespace/name`, for logs
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Split a body into validated documents, in file order
pub fn decode_documents(url: &str, body: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(body).enumerate() {
        let value = Value::deserialize(document).map_err(|e| KubeError::Decode {
            url: url.to_string(),
            message: format!("document {index}: {e}"),
        })?;
        if value.is_null() {
            continue;
        }
        let document = ManifestDocument::from_value(value).map_err(|e| match e {
            KubeError::InvalidManifest(message) => {
                KubeError::InvalidManifest(format!("{url} document {index}: {message}"))
            }
            other => other,
        })?;
        documents.push(document);
    }
    Ok(documents)
}

/// Where manifest bodies come from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the raw body behind a URL
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Fetch and decode every document behind a URL
    async fn documents(&self, url: &str) -> Result<Vec<ManifestDocument>> {
        let body = self.fetch(url).await?;
        let documents = decode_documents(url, &body)?;
        tracing::debug!(url, documents = documents.len(), "decoded manifest");
        Ok(documents)
    }
}

/// Downloads manifests over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: reqwest::Client,
}

impl HttpManifestSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ka-controller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KubeError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |e: reqwest::Error| KubeError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "manifest download failed");
            return Err(KubeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(fetch_error)
    }
}

/// Serves manifests from memory, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct StaticManifests {
    bodies: HashMap<String, String>,
}

impl StaticManifests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl ManifestSource for StaticManifests {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| KubeError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}
