use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::AppError;
use crate::jwt::TokenClaims;

/// Group memberships of an interactive user as reported by the directory service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMemberships {
    #[serde(default, rename = "alp_tenant_id", deserialize_with = "string_or_list")]
    pub tenant_ids: Vec<String>,
    /// Record (study/dataset) ids the user may act on as a researcher.
    #[serde(default, rename = "alp_role_study_researcher", deserialize_with = "string_or_list")]
    pub study_researcher: Vec<String>,
    #[serde(default, rename = "alp_role_tenant_viewer", deserialize_with = "string_or_list")]
    pub tenant_viewer: Vec<String>,
    #[serde(default, rename = "alp_role_study_write_dqd_researcher", deserialize_with = "string_or_list")]
    pub study_write: Vec<String>,
    #[serde(default, rename = "alp_role_user_admin", deserialize_with = "null_as_default")]
    pub is_user_admin: bool,
    #[serde(default, rename = "alp_role_system_admin", deserialize_with = "null_as_default")]
    pub is_system_admin: bool,
    #[serde(default, rename = "alp_role_alp_sqleditor_admin", deserialize_with = "null_as_default")]
    pub is_sql_editor_admin: bool,
    #[serde(default, rename = "alp_role_nifi_admin", deserialize_with = "null_as_default")]
    pub is_nifi_admin: bool,
    #[serde(default, rename = "alp_role_dashboard_viewer", deserialize_with = "null_as_default")]
    pub is_dashboard_viewer: bool,
    #[serde(default, deserialize_with = "string_or_list")]
    pub groups: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(single)) => vec![single],
        Some(OneOrMany::Many(items)) => items,
    })
}

/// Who is calling, decided once per request from the token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityClaims {
    /// A directory-backed user. `groups` is `None` until the directory has been consulted.
    Interactive {
        subject: String,
        directory_user_id: String,
        groups: Option<GroupMemberships>,
    },
    /// A service caller authenticated with client credentials.
    Machine {
        subject: String,
        tenant_id: Option<String>,
        granted_roles: Vec<String>,
    },
}

impl IdentityClaims {
    pub fn subject(&self) -> &str {
        match self {
            IdentityClaims::Interactive { subject, .. } | IdentityClaims::Machine { subject, .. } => subject,
        }
    }

    /// Interactive identity whose directory groups are not attached yet.
    pub fn needs_directory(&self) -> Option<&str> {
        match self {
            IdentityClaims::Interactive {
                directory_user_id,
                groups: None,
                ..
            } => Some(directory_user_id),
            _ => None,
        }
    }

    pub fn attach_groups(&mut self, memberships: GroupMemberships) {
        if let IdentityClaims::Interactive { groups, .. } = self {
            *groups = Some(memberships);
        }
    }
}

/// Classifies the caller.
///
/// A `client_credentials` grant, or a subject equal to the token's own client
/// id, makes a machine caller whose only role is its subject; a `roles`
/// claim grants nothing. Everyone else is interactive and carries whatever
/// directory groups an earlier pipeline step attached to the token.
pub fn resolve_identity(claims: &TokenClaims) -> Result<IdentityClaims, AppError> {
    let subject = claims
        .subject
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::token("token has no subject"))?;

    if claims.is_machine() {
        return Ok(IdentityClaims::Machine {
            granted_roles: vec![subject.clone()],
            subject,
            tenant_id: claims.tenant_id.clone(),
        });
    }

    let directory_user_id = claims.directory_user_id().unwrap_or(&subject).to_string();

    Ok(IdentityClaims::Interactive {
        subject,
        directory_user_id,
        groups: claims.user_mgmt_groups.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::CLIENT_CREDENTIALS_GRANT;
    use serde_json::json;

    #[test]
    fn client_credentials_make_a_machine_identity() {
        let claims = TokenClaims {
            subject: Some("svc-42".into()),
            grant_type: Some(CLIENT_CREDENTIALS_GRANT.into()),
            tenant_id: Some("t-1".into()),
            ..Default::default()
        };

        let identity = resolve_identity(&claims).unwrap();
        assert_eq!(
            identity,
            IdentityClaims::Machine {
                subject: "svc-42".into(),
                tenant_id: Some("t-1".into()),
                granted_roles: vec!["svc-42".into()],
            }
        );
        assert!(identity.needs_directory().is_none());
    }

    #[test]
    fn machine_identity_ignores_roles_claim() {
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &json!({"sub": "svc-42", "client_id": "svc-42", "roles": ["ALP_SYSTEM_ADMIN"]}),
            &jsonwebtoken::EncodingKey::from_secret(b"unused"),
        )
        .unwrap();
        let claims = crate::jwt::decode_claims(&token, "sub").unwrap();

        match resolve_identity(&claims).unwrap() {
            IdentityClaims::Machine { granted_roles, .. } => assert_eq!(granted_roles, vec!["svc-42"]),
            other => panic!("expected machine identity, got {other:?}"),
        }
    }

    #[test]
    fn interactive_identity_needs_directory_until_groups_attached() {
        let claims = TokenClaims {
            subject: Some("alice".into()),
            oid: Some("oid-alice".into()),
            ..Default::default()
        };

        let mut identity = resolve_identity(&claims).unwrap();
        assert_eq!(identity.needs_directory(), Some("oid-alice"));

        identity.attach_groups(GroupMemberships::default());
        assert!(identity.needs_directory().is_none());
    }

    #[test]
    fn missing_subject_is_rejected() {
        assert!(matches!(resolve_identity(&TokenClaims::default()), Err(AppError::Token(_))));
    }

    #[test]
    fn memberships_tolerate_nulls_and_single_strings() {
        let groups: GroupMemberships = serde_json::from_value(json!({
            "alp_tenant_id": "t-1",
            "alp_role_study_researcher": ["S1", "S2"],
            "alp_role_tenant_viewer": null,
            "alp_role_system_admin": null,
            "alp_role_user_admin": true,
            "groups": "ROLE=ALP_ADMIN"
        }))
        .unwrap();

        assert_eq!(groups.tenant_ids, vec!["t-1"]);
        assert_eq!(groups.study_researcher, vec!["S1", "S2"]);
        assert!(groups.tenant_viewer.is_empty());
        assert!(groups.is_user_admin);
        assert!(!groups.is_system_admin);
        assert_eq!(groups.groups, vec!["ROLE=ALP_ADMIN"]);
    }
}
