// Service registry: public path prefix -> internal backend
//
// Built once at startup from configuration (YAML file and/or environment)
// and shared read-only for the lifetime of the process.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

/// Paths of the auth backend that must be reachable without an access token
pub const DEFAULT_AUTH_PUBLIC_PATHS: &[&str] = &["/login", "/signup", "/google", "/refresh", "/logout"];

/// One routable backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    /// Service name (first path segment at the gateway)
    pub name: String,
    /// Internal base URL
    pub url: String,
    /// Paths (after prefix stripping) forwarded without authentication
    #[serde(default)]
    pub public_paths: Vec<String>,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            public_paths: Vec::new(),
        }
    }

    pub fn with_public_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.public_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Whether a path (already stripped of the service prefix) is public
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public_paths.iter().any(|p| normalize(p) == path)
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// YAML registry file
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

/// Static routing table
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    /// Build a registry, validating names and URLs.
    /// Later entries with the same name replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = ServiceEntry>) -> Result<Self> {
        let mut services = BTreeMap::new();
        for entry in entries {
            if entry.name.is_empty() || entry.name.contains('/') {
                anyhow::bail!("invalid service name: {:?}", entry.name);
            }
            Url::parse(&entry.url)
                .with_context(|| format!("invalid URL for service {}: {}", entry.name, entry.url))?;
            services.insert(entry.name.clone(), entry);
        }
        Ok(Self { services })
    }

    /// Parse the YAML registry format:
    ///
    /// ```yaml
    /// services:
    ///   - name: auth
    ///     url: http://localhost:3000
    ///     public_paths: [/login, /refresh]
    /// ```
    pub fn parse_yaml(content: &str) -> Result<Vec<ServiceEntry>> {
        let file: RegistryFile =
            serde_yaml::from_str(content).context("Failed to parse service registry YAML")?;
        Ok(file.services)
    }

    /// Load entries from a YAML file
    pub fn load_yaml_file(path: &Path) -> Result<Vec<ServiceEntry>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service registry {}", path.display()))?;
        Self::parse_yaml(&content)
    }

    /// Parse a `name=url,name=url` list
    pub fn parse_env_list(list: &str) -> Result<Vec<ServiceEntry>> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (name, url) = item
                    .split_once('=')
                    .with_context(|| format!("expected name=url, got {:?}", item))?;
                Ok(ServiceEntry::new(name.trim(), url.trim()))
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Split a request path into (service, remainder).
    /// `/budget/user` -> (`budget`, `/user`); `/budget` -> (`budget`, `/`).
    pub fn split_path(path: &str) -> Option<(&str, &str)> {
        let stripped = path.strip_prefix('/')?;
        let (service, rest) = match stripped.find('/') {
            Some(idx) => (&stripped[..idx], &stripped[idx..]),
            None => (stripped, "/"),
        };
        if service.is_empty() {
            return None;
        }
        Some((service, rest))
    }
}
