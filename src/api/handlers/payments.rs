use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    api::{
        error::{ApiError, JsonBody, JsonResponse},
        AppState,
    },
    payments::{
        CancelRequest, CheckoutResponse, PaymentIntent, RefundRequest, SubscriptionRequest,
        TerminalPayment,
    },
    storage::models::Transaction,
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct PaymentIntentRequest {
    currency: String,
    /// Amount in cents, as entered in the storefront form.
    amount: String,
}

#[utoipa::path(
    post,
    path = "/api/payment-intent",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent, or `{ok: false, message}` when the processor refused", body = PaymentIntent),
    ),
    tag = "payments"
)]
#[instrument(skip_all)]
pub async fn payment_intent(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<PaymentIntentRequest>,
) -> Result<Response, ApiError> {
    let amount: i64 = request
        .amount
        .trim()
        .parse()
        .map_err(|err| {
            ApiError::BadRequest(format!("invalid amount {:?}: {err}", request.amount))
        })?;

    match state
        .checkout
        .processor()
        .create_payment_intent(&request.currency, amount)
        .await
    {
        Ok(intent) => Ok(Json(intent).into_response()),
        Err(err) => {
            error!("Failed to create payment intent: {}", err);
            let message = err
                .user_message()
                .unwrap_or_else(|| "payment could not be started".to_string());
            Ok(Json(CheckoutResponse { ok: false, message }).into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/create-customer-and-subscribe-to-plan",
    request_body = SubscriptionRequest,
    responses(
        (status = 200, description = "Outcome of the checkout", body = CheckoutResponse),
    ),
    tag = "payments"
)]
#[instrument(skip_all)]
pub async fn subscribe(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<SubscriptionRequest>,
) -> impl IntoResponse {
    let result = state.checkout.subscribe(&request).await;
    match &result {
        Ok(order_id) => info!(order_id, "Subscription checkout completed"),
        Err(err) => error!("Subscription checkout failed: {}", err),
    }
    Json(CheckoutResponse::from_result(&result))
}

#[utoipa::path(
    post,
    path = "/api/admin/virtual-terminal-succeeded",
    request_body = TerminalPayment,
    responses(
        (status = 200, description = "Recorded transaction", body = Transaction),
        (status = 400, description = "Processor rejected a lookup", body = JsonResponse),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn virtual_terminal_succeeded(
    state: Extension<Arc<AppState>>,
    JsonBody(payment): JsonBody<TerminalPayment>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction = state.checkout.record_terminal_payment(&payment).await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    post,
    path = "/api/admin/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Charge refunded", body = JsonResponse),
        (status = 400, description = "Amount or currency mismatch, or processor refusal", body = JsonResponse),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn refund(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.checkout.refund(&request).await?;
    Ok(Json(JsonResponse::ok("Refund succeeded!")))
}

#[utoipa::path(
    post,
    path = "/api/admin/cancel-subscription",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Subscription cancelled", body = JsonResponse),
        (status = 400, description = "Processor refusal", body = JsonResponse),
        (status = 401, description = "Missing or invalid token", body = JsonResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn cancel_subscription(
    state: Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.checkout.cancel_subscription(&request).await?;
    Ok(Json(JsonResponse::ok("Subscription cancelled")))
}
