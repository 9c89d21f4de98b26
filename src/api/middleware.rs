use axum::{
    extract::{Extension, Request},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use super::{error::ApiError, AppState};

/// Admit the request only with a valid bearer token; the resolved user is
/// added to the request extensions.
pub async fn require_admin(
    state: Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user = state
        .authenticator
        .authenticate(header)
        .await
        .map_err(|err| {
            warn!("Rejected admin request: {}", err);
            ApiError::from(err)
        })?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
