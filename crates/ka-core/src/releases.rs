//! Remote release lookup contract
//!
//! Components that track upstream releases ask a [`ReleaseLookup`] for the
//! published tags of an `org/repo` and pick the newest one themselves.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{CoreError, Result};

/// Source of published release tags
#[async_trait]
pub trait ReleaseLookup: Send + Sync {
    /// List release tags for a repository, in any order
    async fn releases(&self, org: &str, repo: &str) -> Result<Vec<String>>;
}

/// Resolve the newest release tag of `org/repo`
pub async fn latest_release(lookup: &dyn ReleaseLookup, org: &str, repo: &str) -> Result<String> {
    let tags = lookup.releases(org, repo).await?;
    let latest = newest_tag(&tags).ok_or_else(|| CoreError::NoReleases {
        org: org.to_string(),
        repo: repo.to_string(),
    })?;
    tracing::debug!(org, repo, latest = %latest, "resolved latest release");
    Ok(latest.clone())
}

/// Pick the newest tag
///
/// Tags are compared as semantic versions (a leading `v` is ignored). Stable
/// versions win over pre-releases when any exist; non-semver tags sort below
/// semver ones and among themselves by string order.
pub fn newest_tag(tags: &[String]) -> Option<&String> {
    let has_stable = tags
        .iter()
        .any(|t| parse_tag(t).is_some_and(|v| v.pre.is_empty()));

    tags.iter()
        .filter(|t| !has_stable || parse_tag(t).is_none_or(|v| v.pre.is_empty()))
        .max_by(|a, b| compare_tags(a, b))
}

fn parse_tag(tag: &str) -> Option<semver::Version> {
    semver::Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

fn compare_tags(a: &str, b: &str) -> Ordering {
    match (parse_tag(a), parse_tag(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Table-driven lookup, for tests and air-gapped setups
///
/// Every repository answers with the `fallback` tags plus any tags registered
/// for it with [`FixedReleases::with`].
#[derive(Debug, Clone, Default)]
pub struct FixedReleases {
    fallback: Vec<String>,
    table: HashMap<(String, String), Vec<String>>,
    unavailable: bool,
}

impl FixedReleases {
    /// Create a lookup answering `fallback` for every repository
    pub fn new<I, S>(fallback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fallback: fallback.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Register additional tags for one repository
    pub fn with<I, S>(mut self, org: &str, repo: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .entry((org.to_string(), repo.to_string()))
            .or_default()
            .extend(tags.into_iter().map(Into::into));
        self
    }

    /// A lookup that fails every request
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ReleaseLookup for FixedReleases {
    async fn releases(&self, org: &str, repo: &str) -> Result<Vec<String>> {
        if self.unavailable {
            return Err(CoreError::ReleaseLookup {
                org: org.to_string(),
                repo: repo.to_string(),
                message: "release catalog unavailable".to_string(),
            });
        }

        let mut tags = self.fallback.clone();
        if let Some(extra) = self.table.get(&(org.to_string(), repo.to_string())) {
            tags.extend(extra.iter().cloned());
        }
        Ok(tags)
    }
}
