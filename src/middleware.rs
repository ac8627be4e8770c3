use async_trait::async_trait;
use axum::body::{self, Body, Bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::authz::{Access, AuthzRequest, BodyPeek, ResolvedUser};
use crate::errors::AppError;

/// Largest body the record check will buffer.
pub const MAX_PEEK_BYTES: usize = 10 * 1024 * 1024;

/// The authorized caller, attached to the request for the dispatcher on allow.
///
/// Absent on public paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedCaller {
    pub user_id: String,
    pub tenant_ids: Vec<String>,
    pub roles: Vec<String>,
}

impl From<ResolvedUser> for AuthorizedCaller {
    fn from(user: ResolvedUser) -> Self {
        Self {
            user_id: user.user_id,
            tenant_ids: user.tenant_ids,
            roles: user.roles,
        }
    }
}

/// Holds the request body, buffering it on first peek so it can be replayed downstream.
struct BufferedBody {
    pending: Option<Body>,
    buffered: Option<Bytes>,
}

impl BufferedBody {
    fn new(body: Body) -> Self {
        Self {
            pending: Some(body),
            buffered: None,
        }
    }

    fn into_body(self) -> Body {
        match (self.pending, self.buffered) {
            (Some(body), _) => body,
            (None, Some(bytes)) => Body::from(bytes),
            (None, None) => Body::empty(),
        }
    }
}

#[async_trait]
impl BodyPeek for BufferedBody {
    async fn peek(&mut self) -> Result<Option<Bytes>, AppError> {
        if let Some(body) = self.pending.take() {
            let bytes = body::to_bytes(body, MAX_PEEK_BYTES)
                .await
                .map_err(|err| AppError::internal(format!("failed to buffer request body: {err}")))?;
            self.buffered = Some(bytes);
        }
        Ok(self.buffered.clone())
    }
}

/// Runs the decision engine in front of every route.
pub async fn authorize_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let mut body = BufferedBody::new(body);

    let decision = {
        let authz = AuthzRequest::new(&parts.method, &parts.uri, &parts.headers);
        state.engine.authorize(&authz, &mut body).await
    };

    match decision {
        Ok(Access::Public) => next.run(Request::from_parts(parts, body.into_body())).await,
        Ok(Access::Granted { user, .. }) => {
            parts.extensions.insert(AuthorizedCaller::from(user));
            next.run(Request::from_parts(parts, body.into_body())).await
        }
        Err(err) => err.into_response(),
    }
}
