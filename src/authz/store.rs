use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;
use parking_lot::RwLock;

use super::catalog;
use super::rule::{PolicyRule, RuleSpec};
use crate::errors::AppError;

/// Point-in-time view of the registered rules and role scopes.
///
/// Rules are kept in registration order and evaluated by linear scan: the
/// first rule whose pattern and method filter match wins, regardless of how
/// specific any later rule is.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    rules: Vec<PolicyRule>,
    role_scopes: BTreeMap<String, Vec<String>>,
}

impl PolicySnapshot {
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Returns the index and rule of the first match for `method` + `path`.
    pub fn first_match(&self, method: &Method, path: &str) -> Option<(usize, &PolicyRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(method, path))
    }

    /// Scopes granted by `role`, in first-registration order. Unknown roles grant nothing.
    pub fn scopes_for(&self, role: &str) -> &[String] {
        self.role_scopes.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.role_scopes.iter().map(|(role, scopes)| (role.as_str(), scopes.as_slice()))
    }
}

/// Outcome of one `register_rules` call. Rejected entries never block the accepted ones.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub accepted: usize,
    pub rejected: Vec<AppError>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// The policy registry shared by plugin loading and the decision engine.
///
/// Writers only run during the load phase. Each write publishes a new
/// snapshot; readers keep whatever snapshot they took, so a request never
/// observes a half-applied registration.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the compiled-in role catalog and core rules.
    pub fn with_catalog() -> Self {
        let store = Self::new();

        for (role, scopes) in catalog::ROLE_SCOPES {
            let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
            if let Err(err) = store.register_role_scopes(role, &scopes) {
                tracing::error!(role = %role, error = %err, "catalog role rejected");
            }
        }

        let report = store.register_rules(&catalog::core_rules());
        tracing::debug!(accepted = report.accepted, "core rules registered");

        store
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Appends every well-formed rule in order; malformed ones are logged and skipped.
    pub fn register_rules(&self, rules: &[RuleSpec]) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut compiled = Vec::with_capacity(rules.len());

        for spec in rules {
            match PolicyRule::compile(spec) {
                Ok(rule) => compiled.push(rule),
                Err(err) => {
                    tracing::warn!(path = %spec.path, error = %err, "rejecting policy rule");
                    report.rejected.push(err);
                }
            }
        }

        report.accepted = compiled.len();
        if !compiled.is_empty() {
            let mut guard = self.current.write();
            Arc::make_mut(&mut *guard).rules.extend(compiled);
        }

        report
    }

    /// Unions `scopes` into `role`, creating it if needed. Returns how many scopes were new.
    pub fn register_role_scopes(&self, role: &str, scopes: &[String]) -> Result<usize, AppError> {
        let role = role.trim();
        if role.is_empty() {
            let err = AppError::configuration("role registration with an empty role name");
            tracing::warn!(error = %err, "rejecting role registration");
            return Err(err);
        }

        let mut guard = self.current.write();
        let snapshot = Arc::make_mut(&mut *guard);
        let existing = snapshot.role_scopes.entry(role.to_string()).or_default();

        let mut added = 0;
        for scope in scopes.iter().map(|s| s.trim()) {
            if scope.is_empty() {
                tracing::warn!(role = %role, "skipping empty scope name");
                continue;
            }
            if !existing.iter().any(|s| s == scope) {
                existing.push(scope.to_string());
                added += 1;
            }
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn role_registration_is_a_deduplicated_union() {
        let store = PolicyStore::new();
        assert_eq!(store.register_role_scopes("R", &strings(&["a", "b"])).unwrap(), 2);
        assert_eq!(store.register_role_scopes("R", &strings(&["b", "c", "c"])).unwrap(), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.scopes_for("R"), &strings(&["a", "b", "c"])[..]);
        assert!(snapshot.scopes_for("missing").is_empty());
    }

    #[test]
    fn empty_role_name_is_rejected() {
        let store = PolicyStore::new();
        assert!(matches!(
            store.register_role_scopes("  ", &strings(&["a"])),
            Err(AppError::Configuration(_))
        ));
        assert_eq!(store.snapshot().roles().count(), 0);
    }

    #[test]
    fn malformed_rules_do_not_block_valid_ones() {
        let store = PolicyStore::new();
        let report = store.register_rules(&[
            RuleSpec::new("^/a", &["a.read"]),
            RuleSpec::new("", &["b.read"]),
            RuleSpec::new("^/c", &[]),
            RuleSpec::new("^/d", &["d.read"]),
        ]);

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected.len(), 2);
        let snapshot = store.snapshot();
        let patterns: Vec<&str> = snapshot.rules().iter().map(|r| r.pattern()).collect();
        assert_eq!(patterns, vec!["^/a", "^/d"]);
    }

    #[test]
    fn first_registered_rule_wins() {
        let store = PolicyStore::new();
        store.register_rules(&[RuleSpec::new("^/orders(.*)", &["orders.broad"])]);
        store.register_rules(&[RuleSpec::new("^/orders/42$", &["orders.specific"])]);

        let snapshot = store.snapshot();
        let (index, rule) = snapshot.first_match(&Method::GET, "/orders/42").unwrap();
        assert_eq!(index, 0);
        assert_eq!(rule.required_scopes(), &strings(&["orders.broad"])[..]);
    }

    #[test]
    fn method_filtered_rule_falls_through() {
        let store = PolicyStore::new();
        store.register_rules(&[
            RuleSpec::new("^/config(.*)", &["config.read"]).with_methods(&["GET"]),
            RuleSpec::new("^/config(.*)", &["config.write"]),
        ]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.first_match(&Method::GET, "/config/x").unwrap().0, 0);
        assert_eq!(snapshot.first_match(&Method::PUT, "/config/x").unwrap().0, 1);
        assert!(snapshot.first_match(&Method::GET, "/other").is_none());
    }

    #[test]
    fn snapshots_are_point_in_time() {
        let store = PolicyStore::new();
        store.register_rules(&[RuleSpec::new("^/a", &["a"])]);
        let before = store.snapshot();

        store.register_rules(&[RuleSpec::new("^/b", &["b"])]);
        assert_eq!(before.rules().len(), 1);
        assert_eq!(store.snapshot().rules().len(), 2);
    }

    #[test]
    fn catalog_seed_contains_core_roles() {
        let store = PolicyStore::with_catalog();
        let snapshot = store.snapshot();
        assert!(!snapshot.scopes_for(crate::authz::roles::ALP_SYSTEM_ADMIN).is_empty());
        assert!(!snapshot.scopes_for(crate::authz::roles::STUDY_RESEARCHER).is_empty());
        assert!(!snapshot.rules().is_empty());
    }
}
