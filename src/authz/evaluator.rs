use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{header, HeaderMap, Method, Uri};
use regex::Regex;
use serde_json::Value;

use super::identity::{resolve_identity, GroupMemberships, IdentityClaims};
use super::principal::ResolvedUser;
use super::store::PolicyStore;
use crate::config::{GatewayConfig, MissingRecordPolicy};
use crate::directory::DirectoryClient;
use crate::errors::{AppError, AppResult};
use crate::jwt;

/// The parts of an in-flight request the engine reads.
#[derive(Debug, Clone, Copy)]
pub struct AuthzRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a> AuthzRequest<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self { method, uri, headers }
    }

    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// First value of query parameter `key`, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(self.uri).ok()?;
        pairs
            .into_iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v)
    }

    fn is_json(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
    }
}

/// Read access to the request body that leaves it intact for the downstream handler.
#[async_trait]
pub trait BodyPeek: Send {
    async fn peek(&mut self) -> Result<Option<Bytes>, AppError>;
}

/// A request without a body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

#[async_trait]
impl BodyPeek for NoBody {
    async fn peek(&mut self) -> Result<Option<Bytes>, AppError> {
        Ok(None)
    }
}

/// Outcome of a successful decision.
#[derive(Debug, Clone)]
pub enum Access {
    /// Path is on the public allowlist; no identity was inspected.
    Public,
    /// The caller satisfied `rule`.
    Granted { user: ResolvedUser, rule: String },
}

/// Per-request authorization decision procedure.
///
/// Evaluation order:
/// 1. public allowlist -> allow
/// 2. bearer token present, else 401
/// 3. identity resolution, directory lookup for interactive users (failure -> 500)
/// 4. first matching policy rule, none -> 403
/// 5. required scopes held (global or study), else 403
/// 6. record check for record-scoped callers
/// 7. allow
pub struct DecisionEngine {
    store: Arc<PolicyStore>,
    directory: Arc<dyn DirectoryClient>,
    public_paths: Vec<Regex>,
    record_id_key: String,
    missing_record_policy: MissingRecordPolicy,
    require_tenant: bool,
    directory_timeout: Duration,
    subject_prop: String,
}

impl DecisionEngine {
    pub fn new(
        config: &GatewayConfig,
        store: Arc<PolicyStore>,
        directory: Arc<dyn DirectoryClient>,
    ) -> AppResult<Self> {
        let public_paths = config
            .public_paths
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|err| AppError::configuration(format!("invalid public path `{p}`: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            store,
            directory,
            public_paths,
            record_id_key: config.record_id_key.clone(),
            missing_record_policy: config.missing_record_policy,
            require_tenant: config.require_tenant,
            directory_timeout: config.directory_timeout,
            subject_prop: config.subject_prop.clone(),
        })
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p.is_match(path))
    }

    pub async fn authorize(&self, req: &AuthzRequest<'_>, body: &mut dyn BodyPeek) -> AppResult<Access> {
        let path = req.path();
        if self.is_public(path) {
            tracing::debug!(path = %path, "public path, no authorization check");
            return Ok(Access::Public);
        }

        let token = jwt::bearer_token(req.headers).ok_or_else(|| {
            tracing::warn!(path = %path, "no bearer token");
            AppError::unauthorized("bearer token missing")
        })?;

        let claims = jwt::decode_claims(token, &self.subject_prop).inspect_err(|err| {
            tracing::warn!(path = %path, error = %err, "bearer token could not be decoded");
        })?;
        let mut identity = resolve_identity(&claims)?;

        if let Some(directory_user_id) = identity.needs_directory() {
            let authorization = req
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let groups = self.lookup_groups(authorization, directory_user_id).await?;
            identity.attach_groups(groups);
        }

        if let IdentityClaims::Interactive { subject, groups: Some(groups), .. } = &identity {
            if groups.tenant_ids.is_empty() {
                tracing::error!(user_id = %subject, "security incident: user does not belong to a tenant");
                if self.require_tenant {
                    return Err(AppError::forbidden("user does not belong to a tenant"));
                }
            }
        }

        let policy = self.store.snapshot();
        let Some((index, rule)) = policy.first_match(req.method, path) else {
            tracing::info!(user_id = %identity.subject(), method = %req.method, path = %path, "no applicable policy");
            return Err(AppError::forbidden("no applicable policy"));
        };

        let user = ResolvedUser::from_identity(&identity, &policy);
        if !user.has_all_scopes(rule.required_scopes()) {
            tracing::info!(
                user_id = %user.user_id,
                path = %path,
                rule = %rule.pattern(),
                "forbidden, caller lacks required scopes"
            );
            return Err(AppError::forbidden("insufficient scopes"));
        }

        if user.is_record_scoped() {
            let key = rule.record_id_key().unwrap_or(self.record_id_key.as_str());
            match self.extract_record_id(req, key, body).await? {
                Some(record_id) if user.may_access_record(&record_id) => {
                    tracing::info!(user_id = %user.user_id, path = %path, record_id = %record_id, "authorized record access");
                }
                Some(record_id) => {
                    tracing::warn!(user_id = %user.user_id, path = %path, record_id = %record_id, "no access to record");
                    return Err(AppError::forbidden("record not accessible"));
                }
                None => {
                    tracing::warn!(
                        user_id = %user.user_id,
                        method = %req.method,
                        path = %path,
                        key = %key,
                        "no record id in record-scoped request"
                    );
                    if self.missing_record_policy == MissingRecordPolicy::Deny {
                        return Err(AppError::forbidden("record id missing"));
                    }
                }
            }
        }

        tracing::info!(user_id = %user.user_id, path = %path, rule = %rule.pattern(), rule_index = index, "authorized access");
        Ok(Access::Granted {
            rule: rule.pattern().to_string(),
            user,
        })
    }

    async fn lookup_groups(
        &self,
        authorization: &str,
        user_id: &str,
    ) -> AppResult<GroupMemberships> {
        let lookup = self.directory.group_memberships(authorization, user_id);
        match tokio::time::timeout(self.directory_timeout, lookup).await {
            Ok(Ok(groups)) => Ok(groups),
            Ok(Err(err)) => {
                tracing::error!(user_id = %user_id, error = %err, "directory lookup failed");
                Err(err)
            }
            Err(_) => {
                tracing::error!(user_id = %user_id, timeout_ms = self.directory_timeout.as_millis() as u64, "directory lookup timed out");
                Err(AppError::upstream("directory lookup timed out"))
            }
        }
    }

    /// Record id from the query string, or else from a JSON body.
    async fn extract_record_id(
        &self,
        req: &AuthzRequest<'_>,
        key: &str,
        body: &mut dyn BodyPeek,
    ) -> AppResult<Option<String>> {
        if let Some(id) = req.query_param(key) {
            return Ok(Some(id));
        }

        if !req.is_json() {
            return Ok(None);
        }

        let Some(bytes) = body.peek().await? else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        let json: Value = match serde_json::from_slice(&bytes) {
            Ok(json) => json,
            Err(err) => {
                tracing::debug!(error = %err, "request body is not valid json");
                return Ok(None);
            }
        };

        Ok(match json.get(key) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        })
    }
}
