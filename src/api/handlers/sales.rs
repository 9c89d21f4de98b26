use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

use super::parse_id;
use crate::{
    api::{
        error::{ApiError, JsonBody, JsonResponse},
        AppState,
    },
    storage::{
        models::{Order, Page, PageRequest},
        OrderStore,
    },
};

pub(crate) fn check_page(page: PageRequest) -> Result<PageRequest, ApiError> {
    if page.is_valid() {
        Ok(page)
    } else {
        Err(ApiError::BadRequest(
            "incorrect pagination data; page_size and current_page must be positive and the page must be reachable".to_string(),
        ))
    }
}

async fn orders(
    state: &AppState,
    recurring: bool,
    page: PageRequest,
) -> Result<Json<Page<Order>>, ApiError> {
    let page = check_page(page)?;
    Ok(Json(state.store.list_orders(recurring, page).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/all-sales",
    request_body = PageRequest,
    responses(
        (status = 200, description = "One page of one-off sales, newest first", body = Page<Order>),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn all_sales(
    state: Extension<Arc<AppState>>,
    JsonBody(page): JsonBody<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    orders(&state, false, page).await
}

#[utoipa::path(
    post,
    path = "/api/admin/all-subscriptions",
    request_body = PageRequest,
    responses(
        (status = 200, description = "One page of subscriptions, newest first", body = Page<Order>),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn all_subscriptions(
    state: Extension<Arc<AppState>>,
    JsonBody(page): JsonBody<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    orders(&state, true, page).await
}

#[utoipa::path(
    post,
    path = "/api/admin/get-sale/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with widget, transaction and customer", body = Order),
        (status = 400, description = "Malformed id", body = JsonResponse),
        (status = 404, description = "No such order", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn get_sale(
    state: Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "order")?;
    let order = state
        .store
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order not found".to_string()))?;
    Ok(Json(order))
}
