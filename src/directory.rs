//! Directory (user-management) service client.

use async_trait::async_trait;
use serde::Serialize;

use crate::authz::GroupMemberships;
use crate::errors::AppError;

/// Source of group memberships for interactive users.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// `authorization` is the caller's own `Authorization` header value, forwarded as-is.
    async fn group_memberships(&self, authorization: &str, user_id: &str) -> Result<GroupMemberships, AppError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserGroupsRequest<'a> {
    user_id: &'a str,
}

/// Calls `POST {base_url}/user-group/list` on the directory service.
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn group_memberships(&self, authorization: &str, user_id: &str) -> Result<GroupMemberships, AppError> {
        let url = format!("{}/user-group/list", self.base_url);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&UserGroupsRequest { user_id })
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("directory request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(format!("directory responded with {status}")));
        }

        response
            .json::<GroupMemberships>()
            .await
            .map_err(|err| AppError::upstream(format!("directory response could not be parsed: {err}")))
    }
}
