use std::collections::HashSet;

use super::identity::{GroupMemberships, IdentityClaims};
use super::roles;
use super::store::PolicySnapshot;

/// The caller as the decision engine sees it, rebuilt for every request.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub user_id: String,
    pub tenant_ids: Vec<String>,
    pub roles: Vec<String>,
    pub global_scopes: HashSet<String>,
    /// Scopes that only count for records in `study_access_list`.
    pub study_scopes: HashSet<String>,
    pub study_access_list: Vec<String>,
}

impl ResolvedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_ids: Vec::new(),
            roles: Vec::new(),
            global_scopes: HashSet::new(),
            study_scopes: HashSet::new(),
            study_access_list: Vec::new(),
        }
    }

    pub fn with_tenants(mut self, tenants: impl IntoIterator<Item = String>) -> Self {
        self.tenant_ids = tenants.into_iter().collect();
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_global_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.global_scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_study_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.study_scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_study_access(mut self, records: impl IntoIterator<Item = String>) -> Self {
        self.study_access_list = records.into_iter().collect();
        self
    }

    /// Builds the user from a resolved identity and the role map of `policy`.
    pub fn from_identity(identity: &IdentityClaims, policy: &PolicySnapshot) -> Self {
        match identity {
            IdentityClaims::Machine {
                subject,
                tenant_id,
                granted_roles,
            } => {
                let global_scopes = collect_scopes(policy, granted_roles.iter().map(String::as_str));
                Self::new(subject.clone())
                    .with_tenants(tenant_id.clone())
                    .with_roles(granted_roles.iter().cloned())
                    .with_global_scopes(global_scopes)
            }
            IdentityClaims::Interactive { subject, groups, .. } => {
                let empty = GroupMemberships::default();
                let groups = groups.as_ref().unwrap_or(&empty);

                let roles = derive_roles(groups);
                let global_scopes = collect_scopes(policy, roles.iter().copied());
                let study_scopes = if groups.study_researcher.is_empty() {
                    HashSet::new()
                } else {
                    collect_scopes(policy, [roles::STUDY_RESEARCHER])
                };

                Self::new(subject.clone())
                    .with_tenants(groups.tenant_ids.iter().cloned())
                    .with_roles(roles.into_iter().map(String::from))
                    .with_global_scopes(global_scopes)
                    .with_study_scopes(study_scopes)
                    .with_study_access(groups.study_researcher.iter().cloned())
            }
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.global_scopes.contains(scope) || self.study_scopes.contains(scope)
    }

    /// Every required scope is held, counting study scopes.
    pub fn has_all_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.has_scope(scope))
    }

    /// Record-scoped callers must pass the record check on every rule they satisfy.
    pub fn is_record_scoped(&self) -> bool {
        !self.study_scopes.is_empty()
    }

    pub fn may_access_record(&self, record_id: &str) -> bool {
        self.study_access_list.iter().any(|id| id == record_id)
    }
}

/// Role names granted by directory memberships, in fixed evaluation order.
///
/// Study-researcher membership is not a role here: its scopes are record-scoped
/// and kept apart from the global set.
pub fn derive_roles(groups: &GroupMemberships) -> Vec<&'static str> {
    let checks = [
        (groups.is_user_admin, roles::ALP_USER_ADMIN),
        (groups.is_system_admin, roles::ALP_SYSTEM_ADMIN),
        (groups.is_sql_editor_admin, roles::ALP_SQLEDITOR_ADMIN),
        (groups.is_nifi_admin, roles::ALP_NIFI_ADMIN),
        (groups.is_dashboard_viewer, roles::ALP_DASHBOARD_VIEWER),
        (!groups.tenant_viewer.is_empty(), roles::TENANT_VIEWER),
        (!groups.study_write.is_empty(), roles::STUDY_WRITE_DQD_RESEARCHER),
    ];

    checks
        .into_iter()
        .filter_map(|(held, role)| held.then_some(role))
        .collect()
}

fn collect_scopes<'a>(policy: &PolicySnapshot, roles: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    roles
        .into_iter()
        .flat_map(|role| policy.scopes_for(role).iter().cloned())
        .collect()
}
