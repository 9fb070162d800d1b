// Gateway configuration loaded from environment variables.
// Decision: Registry sources merge in order legacy vars, GATEWAY_SERVICES, YAML file; later wins
// Decision: An "auth" entry without explicit public paths gets the default login/refresh set

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use otter_core::{
    registry::DEFAULT_AUTH_PUBLIC_PATHS, ServiceEntry, ServiceRegistry, TokenConfig,
};

/// Legacy per-service variables: (service name, env var)
const LEGACY_SERVICE_VARS: &[(&str, &str)] = &[
    ("fitness", "FITNESS_URL"),
    ("budget", "BUDGET_URL"),
    ("auth", "AUTH_URL"),
];

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub registry: ServiceRegistry,
    pub tokens: TokenConfig,
    pub upstream_timeout: Duration,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("GATEWAY_PORT") {
            Ok(port) => port
                .parse()
                .with_context(|| format!("Invalid GATEWAY_PORT: {port}"))?,
            Err(_) => 8080,
        };

        let yaml = match non_empty_var("GATEWAY_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                Some(ServiceRegistry::load_yaml_file(&path)?)
            }
            None => None,
        };
        let list = non_empty_var("GATEWAY_SERVICES");
        let legacy: Vec<(&str, String)> = LEGACY_SERVICE_VARS
            .iter()
            .filter_map(|(name, var)| non_empty_var(var).map(|url| (*name, url)))
            .collect();

        let registry = build_registry(yaml, list.as_deref(), &legacy)?;
        if registry.is_empty() {
            tracing::warn!("No services configured; every request will be answered with 404");
        }

        let secret = non_empty_var("JWT_SECRET").context("JWT_SECRET environment variable required")?;
        let tokens = TokenConfig::access_only(secret);

        let upstream_timeout = std::env::var("GATEWAY_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let cors_origins = non_empty_var("OTTER_FRONTEND_URL")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            registry,
            tokens,
            upstream_timeout,
            cors_origins,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Merge the registry sources (extracted for testing)
pub fn build_registry(
    yaml: Option<Vec<ServiceEntry>>,
    list: Option<&str>,
    legacy: &[(&str, String)],
) -> Result<ServiceRegistry> {
    let mut entries: Vec<ServiceEntry> = legacy
        .iter()
        .map(|(name, url)| ServiceEntry::new(*name, url.clone()))
        .collect();

    if let Some(list) = list {
        entries.extend(ServiceRegistry::parse_env_list(list).context("Invalid GATEWAY_SERVICES")?);
    }

    // YAML entries carry their own public paths and are taken as written
    for entry in entries.iter_mut() {
        if entry.name == "auth" && entry.public_paths.is_empty() {
            entry.public_paths = DEFAULT_AUTH_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect();
        }
    }
    if let Some(yaml) = yaml {
        entries.extend(yaml);
    }

    ServiceRegistry::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_vars() {
        let legacy = vec![
            ("fitness", "http://fitness:3002".to_string()),
            ("auth", "http://auth:3000".to_string()),
        ];
        let registry = build_registry(None, None, &legacy).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("fitness").unwrap().url, "http://fitness:3002");
        let auth = registry.get("auth").unwrap();
        assert!(auth.is_public("/login"));
        assert!(auth.is_public("/refresh"));
        assert!(!auth.is_public("/user"));
    }

    #[test]
    fn test_service_list_overrides_legacy() {
        let legacy = vec![("budget", "http://old-budget".to_string())];
        let registry = build_registry(
            None,
            Some("budget=http://budget:3001,dashboard=http://dash:4000"),
            &legacy,
        )
        .unwrap();

        assert_eq!(registry.get("budget").unwrap().url, "http://budget:3001");
        assert_eq!(registry.get("dashboard").unwrap().url, "http://dash:4000");
        assert!(registry.get("dashboard").unwrap().public_paths.is_empty());
    }

    #[test]
    fn test_auth_from_list_gets_default_public_paths() {
        let registry = build_registry(None, Some("auth=http://auth:3000"), &[]).unwrap();
        assert!(registry.get("auth").unwrap().is_public("/signup"));
    }

    #[test]
    fn test_yaml_wins_and_keeps_its_public_paths() {
        let yaml = ServiceRegistry::parse_yaml(
            r#"
services:
  - name: auth
    url: http://auth-yaml:3000
    public_paths: [/login]
"#,
        )
        .unwrap();
        let registry =
            build_registry(Some(yaml), Some("auth=http://auth-env:3000"), &[]).unwrap();

        let auth = registry.get("auth").unwrap();
        assert_eq!(auth.url, "http://auth-yaml:3000");
        assert!(auth.is_public("/login"));
        assert!(!auth.is_public("/refresh"));
    }

    #[test]
    fn test_invalid_list_is_error() {
        assert!(build_registry(None, Some("budget"), &[]).is_err());
        assert!(build_registry(None, Some("budget=not a url"), &[]).is_err());
    }

    #[test]
    fn test_empty_sources() {
        let registry = build_registry(None, None, &[]).unwrap();
        assert!(registry.is_empty());
    }
}
