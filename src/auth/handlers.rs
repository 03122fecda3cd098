use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AvatarResponse, LoginRequest, LoginResponse, PublicUser, RegisterRequest,
            RegisterResponse, SubscriptionRequest,
        },
        jwt::JwtKeys,
        middleware::{authenticate, CurrentUser},
        password::{hash_password_async, verify_password_async},
        repo::CreateUserError,
        repo_types::{NewUser, Subscription, UserPatch},
        services::{gravatar_url, is_valid_email, normalize_email, AVATAR_SIZE, MIN_PASSWORD_LEN},
    },
    error::{AppError, JsonBody, MultipartBody},
    images::services::{process_avatar, AvatarError},
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
}

pub fn protected_routes(state: AppState) -> Router<AppState> {
    let max_avatar = state.config.avatars.max_bytes;
    Router::new()
        .route("/users/current", get(current))
        .route("/users/logout", post(logout))
        .route("/users", patch(update_subscription))
        .route(
            "/users/avatars",
            patch(change_avatar).layer(DefaultBodyLimit::max(max_avatar)),
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict);
    }

    let avatar_url = gravatar_url(&email);
    let password_hash = hash_password_async(payload.password).await?;

    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            subscription: payload.subscription.unwrap_or_default(),
            avatar_url,
            profile: serde_json::Value::Object(payload.profile),
        })
        .await
        .map_err(|e| match e {
            CreateUserError::EmailTaken => AppError::Conflict,
            CreateUserError::Other(e) => {
                error!(error = ?e, "create user failed");
                AppError::Internal(e)
            }
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password_async(payload.password, user.password_hash.clone()).await? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    // the user may have been removed between lookup and update
    state
        .users
        .update_by_id(user.id, UserPatch::token(Some(token.clone())))
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn current(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AppError> {
    state
        .users
        .update_by_id(user.id, UserPatch::token(None))
        .await?;
    info!(user_id = %user.id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_subscription(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<SubscriptionRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let subscription: Subscription = payload
        .subscription
        .parse()
        .map_err(|e| AppError::BadRequest(format!("{e}")))?;

    let updated = state
        .users
        .update_by_id(user.id, UserPatch::subscription(subscription))
        .await?
        .ok_or(AppError::NotFound)?;

    info!(user_id = %user.id, %subscription, "subscription changed");
    Ok(Json(PublicUser::from(&updated)))
}

async fn read_avatar_field(mp: &mut Multipart) -> Result<Bytes, AppError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("avatar") {
            return field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()));
        }
    }
    Err(AppError::BadRequest("avatar file is required".into()))
}

/// PATCH /users/avatars (multipart, field `avatar`)
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    MultipartBody(mut mp): MultipartBody,
) -> Result<Json<AvatarResponse>, AppError> {
    let data = read_avatar_field(&mut mp).await?;
    if data.is_empty() {
        return Err(AppError::BadRequest("avatar file is empty".into()));
    }

    let stored = process_avatar(
        state.avatars.as_ref(),
        &state.config.avatars.tmp_dir,
        user.id,
        data,
        AVATAR_SIZE,
    )
    .await
    .map_err(|e| match e {
        AvatarError::Io(err) => AppError::Internal(err),
        other => AppError::BadRequest(other.to_string()),
    })?;

    let failure = match state
        .users
        .update_by_id(user.id, UserPatch::avatar_url(stored.url.clone()))
        .await
    {
        Ok(Some(_)) => None,
        Ok(None) => {
            warn!(user_id = %user.id, "user vanished before avatar update");
            Some(AppError::NotFound)
        }
        Err(e) => Some(AppError::Internal(e.context("update avatar url"))),
    };
    if let Some(err) = failure {
        // nothing references the stored file any more
        if let Err(e) = state.avatars.delete_file(&stored.filename).await {
            warn!(error = ?e, filename = %stored.filename, "failed to remove orphaned avatar");
        }
        return Err(err);
    }

    info!(user_id = %user.id, avatar_url = %stored.url, "avatar changed");
    Ok(Json(AvatarResponse {
        avatar_url: stored.url,
    }))
}
