use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{parse_id, sales::check_page, valid_email};
use crate::{
    api::{
        error::{ApiError, JsonBody, JsonResponse},
        AppState,
    },
    auth::password::hash_password,
    notify::WsPayload,
    storage::{
        models::{NewUser, Page, PageRequest, User, UserUpdate},
        UserStore,
    },
};

/// Back-office user form. On update, absent fields keep their value and an
/// empty password leaves the password unchanged.
#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct UserForm {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for UserForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserForm")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl UserForm {
    fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    fn validate(&self, creating: bool) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();

        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
        ] {
            let blank = value.as_deref().map_or(creating, |v| v.trim().is_empty());
            if blank {
                errors.insert(field.to_string(), "must not be empty".to_string());
            }
        }

        match self.email.as_deref() {
            Some(email) if !valid_email(email.trim()) => {
                errors.insert("email".to_string(), "invalid email".to_string());
            }
            None if creating => {
                errors.insert("email".to_string(), "must not be empty".to_string());
            }
            _ => {}
        }

        if creating && self.password().is_none() {
            errors.insert("password".to_string(), "must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    fn update(&self) -> UserUpdate {
        UserUpdate {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/all-users",
    request_body = PageRequest,
    responses(
        (status = 200, description = "One page of back-office users", body = Page<User>),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn all_users(
    state: Extension<Arc<AppState>>,
    JsonBody(page): JsonBody<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = check_page(page)?;
    Ok(Json(state.store.list_users(page).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/all-users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User without password hash", body = User),
        (status = 404, description = "No such user", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn one_user(
    state: Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "user")?;
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/api/admin/all-users/edit/{id}",
    params(("id" = i64, Path, description = "User id, 0 to create")),
    request_body = UserForm,
    responses(
        (status = 200, description = "User updated", body = JsonResponse),
        (status = 201, description = "User created", body = JsonResponse),
        (status = 404, description = "No such user", body = JsonResponse),
        (status = 422, description = "Invalid fields", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state, form))]
pub async fn edit_user(
    state: Extension<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(form): JsonBody<UserForm>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "user")?;
    if id < 0 {
        return Err(ApiError::BadRequest("user id must not be negative".to_string()));
    }

    let creating = id == 0;
    form.validate(creating)?;

    let status = if creating {
        let password = form.password().unwrap_or_default();
        let new_id = state
            .store
            .insert_user(NewUser {
                first_name: form.first_name.clone().unwrap_or_default(),
                last_name: form.last_name.clone().unwrap_or_default(),
                email: form.email.clone().unwrap_or_default(),
                password_hash: hash_password(password)?,
            })
            .await?;
        info!(user_id = new_id, "User created");
        StatusCode::CREATED
    } else {
        let update = form.update();
        if update.is_empty() {
            if state.store.get_user(id).await?.is_none() {
                return Err(ApiError::NotFound("user not found".to_string()));
            }
        } else {
            state.store.update_user(id, &update).await?;
        }
        if let Some(password) = form.password() {
            state
                .store
                .update_password(id, &hash_password(password)?)
                .await?;
        }
        info!(user_id = id, "User updated");
        StatusCode::OK
    };

    Ok((
        status,
        Json(JsonResponse::ok("User was successfully saved to the DB")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/admin/all-users/delete/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted and logged out everywhere", body = JsonResponse),
        (status = 404, description = "No such user", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn delete_user(
    state: Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "user")?;

    state.store.delete_user(id).await?;
    state.hub.publish(WsPayload::delete_user(id)).await?;

    info!(user_id = id, "User deleted");

    Ok(Json(JsonResponse::ok("User deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(email: Option<&str>, password: Option<&str>) -> UserForm {
        UserForm {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            email: email.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn create_requires_every_field() {
        match UserForm::default().validate(true) {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<_> = errors.keys().map(String::as_str).collect();
                assert_eq!(fields, ["email", "first_name", "last_name", "password"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_accepts_partial_form() {
        assert!(UserForm::default().validate(false).is_ok());
        assert!(form(Some("ada@example.com"), None).validate(false).is_ok());
    }

    #[test]
    fn bad_email_is_reported() {
        assert!(matches!(
            form(Some("ada"), Some("secret")).validate(true),
            Err(ApiError::Validation(errors)) if errors.contains_key("email")
        ));
    }

    #[test]
    fn empty_password_means_unchanged() {
        assert!(form(None, Some("")).password().is_none());
        assert_eq!(form(None, Some("pw")).password(), Some("pw"));
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", form(None, Some("hunter2")));
        assert!(!rendered.contains("hunter2"));
    }
}
