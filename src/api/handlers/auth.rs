use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    api::{
        error::{ApiError, JsonBody, JsonResponse},
        AppState,
    },
    auth::{password::verify_password, AuthToken},
    storage::UserStore,
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct Credentials {
    email: String,
    password: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct TokenResponse {
    error: bool,
    message: String,
    authentication_token: AuthToken,
}

#[utoipa::path(
    post,
    path = "/api/authenticate",
    request_body = Credentials,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Unknown email or wrong password", body = JsonResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn authenticate(
    state: Extension<Arc<AppState>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = state.store.get_user_by_email(&credentials.email).await? else {
        info!("Login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&credentials.password, &user.password_hash)? {
        info!(user_id = user.id, "Incorrect credentials entered");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.authenticator.issue(&user).await?;

    Ok(Json(TokenResponse {
        error: false,
        message: format!("Token for {:?} created.", credentials.email),
        authentication_token: token,
    }))
}

#[utoipa::path(
    post,
    path = "/api/is-authenticated",
    responses(
        (status = 200, description = "Bearer token is valid", body = JsonResponse),
        (status = 401, description = "Missing, malformed, unknown or expired token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn is_authenticated(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let user = state.authenticator.authenticate(header).await.map_err(|err| {
        error!("Authentication failed: {}", err);
        ApiError::from(err)
    })?;

    Ok(Json(JsonResponse::ok(format!(
        "Authenticated user: {}",
        user.email
    ))))
}
