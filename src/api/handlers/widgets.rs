use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

use super::parse_id;
use crate::{
    api::{
        error::{ApiError, JsonResponse},
        AppState,
    },
    storage::{models::Widget, OrderStore},
};

#[utoipa::path(
    get,
    path = "/api/widget/{id}",
    params(("id" = i64, Path, description = "Widget id")),
    responses(
        (status = 200, description = "Widget for sale", body = Widget),
        (status = 400, description = "Malformed id", body = JsonResponse),
        (status = 404, description = "No such widget", body = JsonResponse),
    ),
    tag = "catalog"
)]
#[instrument(skip(state))]
pub async fn get_widget(
    state: Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "widget")?;
    let widget = state
        .store
        .get_widget(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("widget not found".to_string()))?;
    Ok(Json(widget))
}
