use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A rule as it appears in a plugin manifest or in the compiled catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub path: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_methods: Option<Vec<String>>,
    /// Overrides the configured record-id key for requests matching this rule.
    #[serde(default, rename = "datasetId", skip_serializing_if = "Option::is_none")]
    pub record_id_key: Option<String>,
}

impl RuleSpec {
    pub fn new(path: impl Into<String>, scopes: &[&str]) -> Self {
        Self {
            path: path.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            http_methods: None,
            record_id_key: None,
        }
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.http_methods = Some(methods.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_record_id_key(mut self, key: impl Into<String>) -> Self {
        self.record_id_key = Some(key.into());
        self
    }
}

/// A validated rule with its path pattern compiled.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pattern: Regex,
    http_methods: Option<Vec<Method>>,
    required_scopes: Vec<String>,
    record_id_key: Option<String>,
}

impl PolicyRule {
    pub fn compile(spec: &RuleSpec) -> Result<Self, AppError> {
        if spec.path.trim().is_empty() {
            return Err(AppError::configuration("rule has an empty path pattern"));
        }

        let required_scopes: Vec<String> = spec
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if required_scopes.is_empty() {
            return Err(AppError::configuration(format!(
                "rule `{}` has no required scopes",
                spec.path
            )));
        }

        let pattern = Regex::new(&spec.path)
            .map_err(|err| AppError::configuration(format!("rule `{}` is not a valid pattern: {err}", spec.path)))?;

        let http_methods = match &spec.http_methods {
            None => None,
            Some(methods) => {
                let parsed = methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.trim().to_uppercase().as_bytes()).map_err(|_| {
                            AppError::configuration(format!("rule `{}` has invalid method `{m}`", spec.path))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(parsed)
            }
        };

        Ok(Self {
            pattern,
            http_methods,
            required_scopes,
            record_id_key: spec.record_id_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    pub fn http_methods(&self) -> Option<&[Method]> {
        self.http_methods.as_deref()
    }

    pub fn record_id_key(&self) -> Option<&str> {
        self.record_id_key.as_deref()
    }

    /// Pattern matches the path and, when a method filter is present, it contains `method`.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if !self.pattern.is_match(path) {
            return false;
        }
        match &self.http_methods {
            None => true,
            Some(methods) => methods.contains(method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_filter_is_optional() {
        let any = PolicyRule::compile(&RuleSpec::new("^/orders(.*)", &["orders.read"])).unwrap();
        assert!(any.matches(&Method::DELETE, "/orders/42"));

        let get_only =
            PolicyRule::compile(&RuleSpec::new("^/orders(.*)", &["orders.read"]).with_methods(&["get"])).unwrap();
        assert!(get_only.matches(&Method::GET, "/orders/42"));
        assert!(!get_only.matches(&Method::POST, "/orders/42"));
        assert!(!get_only.matches(&Method::GET, "/invoices"));
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(PolicyRule::compile(&RuleSpec::new("", &["a"])).is_err());
        assert!(PolicyRule::compile(&RuleSpec::new("^/x", &[])).is_err());
        assert!(PolicyRule::compile(&RuleSpec::new("^/x", &["  "])).is_err());
        assert!(PolicyRule::compile(&RuleSpec::new("^/x(", &["a"])).is_err());
        assert!(PolicyRule::compile(&RuleSpec::new("^/x", &["a"]).with_methods(&["G ET"])).is_err());
    }

    #[test]
    fn deserializes_manifest_form() {
        let spec: RuleSpec = serde_json::from_value(serde_json::json!({
            "path": "^/gateway/api/dataset(.*)",
            "scopes": ["gateway.dataset.read"],
            "httpMethods": ["GET"],
            "datasetId": "studyId"
        }))
        .unwrap();

        let rule = PolicyRule::compile(&spec).unwrap();
        assert_eq!(rule.record_id_key(), Some("studyId"));
        assert_eq!(rule.http_methods(), Some(&[Method::GET][..]));
    }
}
