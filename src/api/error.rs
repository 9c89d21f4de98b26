use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::{
    auth::AuthError,
    encryption::EncryptionError,
    mailer::MailError,
    notify::NotifyError,
    payments::{CheckoutError, PaymentError},
    storage::StoreError,
};

pub const MSG_INVALID_CREDENTIALS: &str =
    "authentication failed; check your credentials and try again";
pub const MSG_INTERNAL: &str = "internal server error; if it repeats, please contact the support";
pub const MSG_VALIDATION: &str = "Validation failed!";

/// Envelope shared by every JSON reply of the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct JsonResponse {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl JsonResponse {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            errors: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication failed; check your credentials and try again")]
    InvalidCredentials,
    #[error("{0}")]
    NotFound(String),
    #[error("Validation failed!")]
    Validation(BTreeMap<String, String>),
    #[error("internal server error; if it repeats, please contact the support")]
    Internal,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log `err` and hide it behind the generic 500 reply.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        error!("{err}");
        Self::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let errors = match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        };
        let body = JsonResponse {
            error: true,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_internal() {
            Self::internal(err)
        } else {
            Self::InvalidCredentials
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::Conflict(what) => Self::BadRequest(format!("{what} already exists")),
            other => Self::internal(other),
        }
    }
}

impl From<EncryptionError> for ApiError {
    fn from(err: EncryptionError) -> Self {
        Self::internal(err)
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        Self::internal(err)
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        Self::internal(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err.user_message() {
            Some(message) => {
                error!("{err}");
                Self::BadRequest(message)
            }
            None => Self::internal(err),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Payment(err) => err.into(),
            CheckoutError::Persistence(..) | CheckoutError::Invoice(_) => Self::internal(err),
            other => {
                error!("{other}");
                Self::BadRequest(other.to_string())
            }
        }
    }
}

/// `Json` extractor whose rejections use the API error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(&rejection)),
        }
    }
}

fn reject(rejection: &JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::BadRequest("body must not be larger than 1MB".to_string());
    }
    ApiError::BadRequest(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_of(err: ApiError) -> anyhow::Result<(StatusCode, Value)> {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[tokio::test]
    async fn invalid_credentials_reply() -> anyhow::Result<()> {
        let (status, body) = body_of(ApiError::InvalidCredentials).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"error": true, "message": MSG_INVALID_CREDENTIALS})
        );
        Ok(())
    }

    #[tokio::test]
    async fn validation_reply_lists_fields() -> anyhow::Result<()> {
        let mut errors = BTreeMap::new();
        errors.insert("email".to_string(), "invalid email".to_string());
        let (status, body) = body_of(ApiError::Validation(errors)).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], MSG_VALIDATION);
        assert_eq!(body["errors"]["email"], "invalid email");
        Ok(())
    }

    #[test]
    fn auth_errors_map_by_origin() {
        assert!(matches!(
            ApiError::from(AuthError::NoMatchingUser),
            ApiError::InvalidCredentials
        ));
        assert!(matches!(
            ApiError::from(AuthError::Store(StoreError::Timeout(
                std::time::Duration::from_secs(3)
            ))),
            ApiError::Internal
        ));
    }

    #[test]
    fn invalid_processor_requests_are_400() {
        let err = ApiError::from(CheckoutError::Payment(PaymentError::InvalidRequest(
            "No such payment_intent".into(),
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "No such payment_intent");

        let err = ApiError::from(PaymentError::Api("upstream".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_not_found_is_404() {
        let err = ApiError::from(StoreError::NotFound("order"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "order not found");
    }
}
