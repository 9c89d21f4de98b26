use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{render, InvoiceOrder, InvoiceState};
use crate::{
    api::error::{ApiError, JsonBody, JsonResponse},
    mailer::{templates, Attachment, OutgoingEmail},
};

#[utoipa::path(
    post,
    path = "/invoice/create-and-send",
    request_body = InvoiceOrder,
    responses(
        (status = 200, description = "Invoice stored and mailed", body = JsonResponse),
        (status = 400, description = "Malformed order", body = JsonResponse),
        (status = 500, description = "Invoice could not be written or sent", body = JsonResponse),
    ),
    tag = "invoice"
)]
#[instrument(skip_all, fields(order_id = order.id))]
pub async fn create_and_send(
    state: Extension<Arc<InvoiceState>>,
    JsonBody(order): JsonBody<InvoiceOrder>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = format!("{}.txt", order.id);
    let document = render(&order);

    let path = state.invoices_dir.join(&filename);
    tokio::fs::write(&path, &document).await.map_err(|err| {
        error!("Failed to write {}: {}", path.display(), err);
        ApiError::Internal
    })?;

    let email = OutgoingEmail::from_template(
        &state.mail_from,
        &order.email,
        "Your invoice",
        templates::INVOICE,
        &json!({
            "first_name": order.first_name,
            "order_id": order.id,
        }),
    )?
    .with_attachment(Attachment {
        filename: filename.clone(),
        content_type: "text/plain; charset=utf-8".to_string(),
        body: document.into_bytes(),
    });
    state.mailer.deliver(email).await?;

    info!("invoice {} sent", filename);

    Ok((
        StatusCode::OK,
        Json(JsonResponse::ok(format!(
            "Invoice {filename} has been created and sent to {}.",
            order.email
        ))),
    ))
}
