use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info, instrument, warn};
use url::form_urlencoded::byte_serialize;
use utoipa::ToSchema;

use crate::{
    api::{
        error::{ApiError, JsonBody, JsonResponse},
        AppState,
    },
    auth::password::hash_password,
    mailer::{templates, Mailer},
    signer::query_param,
    storage::UserStore,
};

pub const MSG_RESET_LINK_SENT: &str =
    "If your email exists in our DB, then password reset link was successfully sent! Check your inbox!";

#[derive(ToSchema, Deserialize, Debug)]
pub struct ForgotPassword {
    email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetLink {
    link: String,
}

#[derive(ToSchema, Deserialize)]
pub struct ResetPassword {
    link: String,
    password: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ResetLinkStatus {
    error: bool,
    message: String,
    email: String,
}

/// Build the signed reset link mailed to `email`.
///
/// # Errors
/// Encryption failures.
pub fn reset_link(state: &AppState, email: &str) -> Result<String, ApiError> {
    let encrypted = state.encryptor.encrypt(email)?;
    let link = format!(
        "{}/reset-password?email={}",
        state.config.frontend_url(),
        byte_serialize(encrypted.as_bytes()).collect::<String>()
    );
    Ok(state.signer.sign(&link))
}

/// Check signature and age of `link`, then recover the email it carries.
fn email_from_link(state: &AppState, link: &str) -> Result<String, ApiError> {
    if !state.signer.verify(link) {
        warn!("Rejected reset link: tampered");
        return Err(ApiError::InvalidCredentials);
    }

    if state
        .signer
        .is_expired(link, state.config.reset_link_max_age_minutes())
    {
        warn!("Rejected reset link: stale");
        return Err(ApiError::InvalidCredentials);
    }

    let encrypted = query_param(link, "email")
        .ok_or_else(|| ApiError::BadRequest("wrong email data".to_string()))?;

    state.encryptor.decrypt(&encrypted).map_err(|err| {
        warn!("Failed to decrypt reset link email: {}", err);
        ApiError::BadRequest("wrong email data".to_string())
    })
}

#[utoipa::path(
    post,
    path = "/api/forgot-password",
    request_body = ForgotPassword,
    responses(
        (status = 200, description = "Same reply whether or not the email is known", body = JsonResponse),
        (status = 500, description = "User lookup failed", body = JsonResponse),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<ForgotPassword>,
) -> Result<impl IntoResponse, ApiError> {
    let response = Json(JsonResponse::ok(MSG_RESET_LINK_SENT));

    let Some(user) = state.store.get_user_by_email(&request.email).await? else {
        info!("Password reset requested for unknown email");
        return Ok(response);
    };

    // Delivery problems are logged only, the caller gets the same reply as for
    // an unknown address.
    let link = match reset_link(&state, &user.email) {
        Ok(link) => link,
        Err(err) => {
            error!(user_id = user.id, "Failed to build password reset link: {}", err);
            return Ok(response);
        }
    };

    match state
        .mailer
        .send(
            state.config.mail_from(),
            &user.email,
            "Password Reset Link",
            templates::PASSWORD_RESET,
            &json!({ "link": link }),
        )
        .await
    {
        Ok(()) => info!(user_id = user.id, "Password reset link sent"),
        Err(err) => error!(user_id = user.id, "Failed to send password reset link: {}", err),
    }

    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/verify-reset-link",
    request_body = ResetLink,
    responses(
        (status = 200, description = "Link is authentic and fresh", body = ResetLinkStatus),
        (status = 401, description = "Link was altered or is too old", body = JsonResponse),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn verify_reset_link(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<ResetLink>,
) -> Result<impl IntoResponse, ApiError> {
    let email = email_from_link(&state, &request.link)?;

    Ok(Json(ResetLinkStatus {
        error: false,
        message: "Reset link is valid".to_string(),
        email,
    }))
}

#[utoipa::path(
    post,
    path = "/api/reset-password",
    request_body = ResetPassword,
    responses(
        (status = 200, description = "Password changed", body = JsonResponse),
        (status = 401, description = "Link was altered or is too old", body = JsonResponse),
        (status = 422, description = "Password missing", body = JsonResponse),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<ResetPassword>,
) -> Result<impl IntoResponse, ApiError> {
    if request.password.is_empty() {
        let mut errors = BTreeMap::new();
        errors.insert("password".to_string(), "must not be empty".to_string());
        return Err(ApiError::Validation(errors));
    }

    let email = email_from_link(&state, &request.link)?;

    let user = state
        .store
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("user not found".to_string()))?;

    let password_hash = hash_password(&request.password)?;
    state.store.update_password(user.id, &password_hash).await?;

    info!(user_id = user.id, "Password has been changed");

    Ok(Json(JsonResponse::ok(format!(
        "Password has been successfully changed for user {email:?}"
    ))))
}
