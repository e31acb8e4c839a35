//! GitHub-backed release lookup
//!
//! Lists the published releases of a repository through the REST API and
//! keeps the answer for a short while; unauthenticated clients get 60
//! requests per hour.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ka_core::{CoreError, ReleaseLookup};
use serde::Deserialize;

pub const GITHUB_API: &str = "https://api.github.com";

/// How long a release list is reused
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
}

type CacheKey = (String, String);

/// [`ReleaseLookup`] over the GitHub releases API
pub struct GithubReleases {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cache_ttl: Duration,
    cache: Mutex<HashMap<CacheKey, (Instant, Vec<String>)>>,
}

impl GithubReleases {
    pub fn new(timeout: Duration, token: Option<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ka-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: GITHUB_API.to_string(),
            token,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Point at another API root (GitHub Enterprise, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Reuse answers for `ttl`; zero disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<String>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.cache_ttl)
            .map(|(_, tags)| tags.clone())
    }

    fn remember(&self, key: CacheKey, tags: &[String]) {
        if self.cache_ttl.is_zero() {
            return;
        }
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (Instant::now(), tags.to_vec()));
    }

    async fn fetch(&self, org: &str, repo: &str) -> Result<Vec<String>, String> {
        let url = format!("{}/repos/{org}/{repo}/releases?per_page=100", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(org, repo, status = status.as_u16(), "release lookup failed");
            return Err(format!("GitHub answered HTTP {}", status.as_u16()));
        }

        let releases: Vec<GithubRelease> = response.json().await.map_err(|e| e.to_string())?;
        Ok(releases
            .into_iter()
            .filter(|r| !r.draft)
            .map(|r| r.tag_name)
            .collect())
    }
}

#[async_trait]
impl ReleaseLookup for GithubReleases {
    async fn releases(&self, org: &str, repo: &str) -> ka_core::Result<Vec<String>> {
        let key = (org.to_string(), repo.to_string());
        if let Some(tags) = self.cached(&key) {
            return Ok(tags);
        }

        let tags = self
            .fetch(org, repo)
            .await
            .map_err(|message| CoreError::ReleaseLookup {
                org: org.to_string(),
                repo: repo.to_string(),
                message,
            })?;
        tracing::debug!(org, repo, releases = tags.len(), "listed releases");
        self.remember(key, &tags);
        Ok(tags)
    }
}
