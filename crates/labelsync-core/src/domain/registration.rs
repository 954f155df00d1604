//! Repository identity and per-service registration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::error::ConfigurationError;

/// A repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoSlug {
    slug: String,
    split: usize,
}

impl RepoSlug {
    pub fn parse(slug: &str) -> Result<Self, ConfigurationError> {
        let slug = slug.trim();
        let mut parts = slug.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self {
                    slug: slug.to_string(),
                    split: owner.len(),
                })
            }
            _ => Err(ConfigurationError::InvalidRepoSlug(slug.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.slug[..self.split]
    }

    pub fn name(&self) -> &str {
        &self.slug[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.slug
    }
}

impl FromStr for RepoSlug {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug)
    }
}

impl Serialize for RepoSlug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.slug)
    }
}

impl<'de> Deserialize<'de> for RepoSlug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RepoSlug::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Repositories known to one service and whether each takes part in
/// scheduled reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoRegistry {
    repos: BTreeMap<RepoSlug, bool>,
}

impl RepoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository, or overwrite its flag if already known.
    pub fn register(&mut self, repo: RepoSlug, enabled: bool) {
        self.repos.insert(repo, enabled);
    }

    /// Flip the flag of an already-registered repository.
    pub fn set_enabled(
        &mut self,
        service: &str,
        repo: &RepoSlug,
        enabled: bool,
    ) -> Result<(), ConfigurationError> {
        match self.repos.get_mut(repo) {
            Some(flag) => {
                *flag = enabled;
                Ok(())
            }
            None => Err(ConfigurationError::UnknownRepository {
                service: service.to_string(),
                repo: repo.to_string(),
            }),
        }
    }

    pub fn contains(&self, repo: &RepoSlug) -> bool {
        self.repos.contains_key(repo)
    }

    pub fn is_enabled(&self, repo: &RepoSlug) -> bool {
        self.repos.get(repo).copied().unwrap_or(false)
    }

    /// Enabled repositories, sorted.
    pub fn enabled(&self) -> impl Iterator<Item = &RepoSlug> {
        self.repos
            .iter()
            .filter(|(_, &enabled)| enabled)
            .map(|(repo, _)| repo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepoSlug, bool)> {
        self.repos.iter().map(|(repo, &enabled)| (repo, enabled))
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

impl FromIterator<(RepoSlug, bool)> for RepoRegistry {
    fn from_iter<T: IntoIterator<Item = (RepoSlug, bool)>>(iter: T) -> Self {
        Self {
            repos: iter.into_iter().collect(),
        }
    }
}
