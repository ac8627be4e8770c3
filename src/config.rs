use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_RECORD_ID_KEY: &str = "datasetId";
pub const DEFAULT_SUBJECT_PROP: &str = "sub";
pub const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PLUGIN_BASE_PATH: &str = "./plugins/node_modules";

/// Always public, even when `AUTHZ_PUBLIC_PATHS` replaces the defaults.
pub const HEALTH_PATH_PATTERN: &str = "^/_internal/health$";

pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    HEALTH_PATH_PATTERN,
    "^/system-portal/dataset/public/list(.*)",
    "^/system-portal/config/public(.*)",
];

/// Manifest role names that stand in for runtime client identifiers.
pub const SVC_CLIENT_PLACEHOLDER: &str = "IDP_ALP_SVC_CLIENT_ID";
pub const DATA_CLIENT_PLACEHOLDER: &str = "IDP_ALP_DATA_CLIENT_ID";

/// What to do when a record-scoped caller sends no record identifier at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingRecordPolicy {
    /// Log a warning and let the request through.
    #[default]
    Allow,
    /// Deny with 403.
    Deny,
}

impl MissingRecordPolicy {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(AppError::configuration(format!(
                "AUTHZ_MISSING_RECORD_ID must be `allow` or `deny`, got `{other}`"
            ))),
        }
    }
}

/// Runtime client ids substituted for the manifest placeholder role names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdSubstitutions {
    pub svc_client_id: Option<String>,
    pub data_client_id: Option<String>,
}

impl ClientIdSubstitutions {
    /// Maps a manifest role name to the name it is registered under.
    pub fn remap<'a>(&'a self, role: &'a str) -> &'a str {
        match role {
            SVC_CLIENT_PLACEHOLDER => self.svc_client_id.as_deref().unwrap_or(role),
            DATA_CLIENT_PLACEHOLDER => self.data_client_id.as_deref().unwrap_or(role),
            _ => role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub public_paths: Vec<String>,
    pub record_id_key: String,
    pub missing_record_policy: MissingRecordPolicy,
    pub require_tenant: bool,
    pub directory_url: Option<String>,
    pub directory_timeout: Duration,
    pub subject_prop: String,
    pub client_ids: ClientIdSubstitutions,
    pub plugin_base_path: PathBuf,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            record_id_key: DEFAULT_RECORD_ID_KEY.to_string(),
            missing_record_policy: MissingRecordPolicy::default(),
            require_tenant: false,
            directory_url: None,
            directory_timeout: Duration::from_millis(DEFAULT_DIRECTORY_TIMEOUT_MS),
            subject_prop: DEFAULT_SUBJECT_PROP.to_string(),
            client_ids: ClientIdSubstitutions::default(),
            plugin_base_path: PathBuf::from(DEFAULT_PLUGIN_BASE_PATH),
            port: 8000,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let public_paths = match var("AUTHZ_PUBLIC_PATHS") {
            Some(raw) => {
                let mut paths: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                if !paths.iter().any(|p| p == HEALTH_PATH_PATTERN) {
                    paths.push(HEALTH_PATH_PATTERN.to_string());
                }
                paths
            }
            None => defaults.public_paths,
        };

        let missing_record_policy = match var("AUTHZ_MISSING_RECORD_ID") {
            Some(raw) => MissingRecordPolicy::parse(&raw)?,
            None => defaults.missing_record_policy,
        };

        let require_tenant = match var("AUTHZ_REQUIRE_TENANT") {
            Some(raw) => parse_bool("AUTHZ_REQUIRE_TENANT", &raw)?,
            None => defaults.require_tenant,
        };

        let directory_timeout = match var("DIRECTORY_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| AppError::configuration("DIRECTORY_TIMEOUT_MS must be a valid integer"))?,
            None => defaults.directory_timeout,
        };

        let port = match var("APP_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            None => defaults.port,
        };

        Ok(Self {
            public_paths,
            record_id_key: var("AUTHZ_RECORD_ID_KEY").unwrap_or(defaults.record_id_key),
            missing_record_policy,
            require_tenant,
            directory_url: var("DIRECTORY_URL"),
            directory_timeout,
            subject_prop: var("GATEWAY_IDP_SUBJECT_PROP").unwrap_or(defaults.subject_prop),
            client_ids: ClientIdSubstitutions {
                svc_client_id: var("IDP_ALP_SVC_CLIENT_ID"),
                data_client_id: var("IDP_ALP_DATA_CLIENT_ID"),
            },
            plugin_base_path: var("PLUGIN_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.plugin_base_path),
            port,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(AppError::configuration(format!("{key} must be a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let cfg = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.record_id_key, "datasetId");
        assert_eq!(cfg.subject_prop, "sub");
        assert_eq!(cfg.missing_record_policy, MissingRecordPolicy::Allow);
        assert_eq!(cfg.directory_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.public_paths.len(), DEFAULT_PUBLIC_PATHS.len());
        assert!(!cfg.require_tenant);
    }

    #[test]
    fn parses_overrides() {
        let cfg = GatewayConfig::from_lookup(lookup(&[
            ("AUTHZ_PUBLIC_PATHS", "^/public/.*, ^/status$"),
            ("AUTHZ_RECORD_ID_KEY", "studyId"),
            ("AUTHZ_MISSING_RECORD_ID", "Deny"),
            ("AUTHZ_REQUIRE_TENANT", "true"),
            ("DIRECTORY_TIMEOUT_MS", "250"),
            ("IDP_ALP_SVC_CLIENT_ID", "svc-client"),
        ]))
        .unwrap();

        assert_eq!(cfg.public_paths, vec!["^/public/.*", "^/status$", HEALTH_PATH_PATTERN]);
        assert_eq!(cfg.record_id_key, "studyId");
        assert_eq!(cfg.missing_record_policy, MissingRecordPolicy::Deny);
        assert!(cfg.require_tenant);
        assert_eq!(cfg.directory_timeout, Duration::from_millis(250));
        assert_eq!(cfg.client_ids.remap(SVC_CLIENT_PLACEHOLDER), "svc-client");
        assert_eq!(cfg.client_ids.remap(DATA_CLIENT_PLACEHOLDER), DATA_CLIENT_PLACEHOLDER);
        assert_eq!(cfg.client_ids.remap("TENANT_VIEWER"), "TENANT_VIEWER");
    }

    #[test]
    fn health_pattern_is_not_duplicated() {
        let cfg = GatewayConfig::from_lookup(lookup(&[("AUTHZ_PUBLIC_PATHS", "^/_internal/health$,^/docs$")])).unwrap();
        assert_eq!(cfg.public_paths, vec![HEALTH_PATH_PATTERN, "^/docs$"]);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(GatewayConfig::from_lookup(lookup(&[("DIRECTORY_TIMEOUT_MS", "soon")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("AUTHZ_MISSING_RECORD_ID", "maybe")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("AUTHZ_REQUIRE_TENANT", "perhaps")])).is_err());
    }
}
