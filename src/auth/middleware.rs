use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    auth::{jwt::JwtKeys, repo_types::User},
    error::AppError,
    state::AppState,
};

/// Splits `Bearer <token>`. Any other scheme, or a missing token, yields `None`.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    (scheme == "Bearer" && !token.is_empty()).then_some(token)
}

async fn resolve_user(state: &AppState, header: &str) -> Result<User, &'static str> {
    let token = bearer_token(header).ok_or("missing or non-bearer authorization")?;

    let keys = JwtKeys::new(&state.config.jwt);
    let claims = keys.verify(token).map_err(|e| {
        debug!(error = %e, "token verification failed");
        "invalid or expired token"
    })?;

    let user = match state.users.find_by_id(claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err("token subject not found"),
        Err(e) => {
            warn!(error = ?e, user_id = %claims.sub, "user lookup failed during auth");
            return Err("user lookup failed");
        }
    };

    if state.config.auth.enforce_stored_token && user.token.as_deref() != Some(token) {
        return Err("token does not match active session");
    }

    Ok(user)
}

/// Rejects the request with 401 unless it carries a valid bearer token for an existing user.
/// On success the resolved [`User`] is stored in the request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match resolve_user(&state, header).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(reason) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                reason,
                "authentication failed"
            );
            Err(AppError::Unauthorized)
        }
    }
}

/// The user attached by [`authenticate`].
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}
