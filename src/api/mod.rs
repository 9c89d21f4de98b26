use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware::from_fn,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod error;
pub mod handlers;
mod middleware;
// OpenAPI document for every route registered below.
mod openapi;
mod state;

pub use openapi::{openapi, ApiDoc};
pub use state::{
    ApiConfig, AppState, Services, DEFAULT_FRONTEND_URL, DEFAULT_MAIL_FROM,
    DEFAULT_RESET_LINK_MAX_AGE_MINUTES,
};

use handlers::{auth, health, password, payments, sales, users, widgets, ws};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the API router around `state`.
///
/// # Errors
/// Returns an error if the configured frontend URL is not a valid origin.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let frontend_origin = frontend_origin(state.config.frontend_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let admin = Router::new()
        .route(
            "/api/admin/virtual-terminal-succeeded",
            post(payments::virtual_terminal_succeeded),
        )
        .route("/api/admin/all-sales", post(sales::all_sales))
        .route("/api/admin/all-subscriptions", post(sales::all_subscriptions))
        .route("/api/admin/get-sale/:id", post(sales::get_sale))
        .route("/api/admin/refund", post(payments::refund))
        .route(
            "/api/admin/cancel-subscription",
            post(payments::cancel_subscription),
        )
        .route("/api/admin/all-users", post(users::all_users))
        .route("/api/admin/all-users/:id", post(users::one_user))
        .route("/api/admin/all-users/edit/:id", post(users::edit_user))
        .route("/api/admin/all-users/delete/:id", post(users::delete_user))
        .route_layer(from_fn(middleware::require_admin));

    let app = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(openapi()) }),
        )
        .route("/api/payment-intent", post(payments::payment_intent))
        .route("/api/widget/:id", get(widgets::get_widget))
        .route(
            "/api/create-customer-and-subscribe-to-plan",
            post(payments::subscribe),
        )
        .route("/api/authenticate", post(auth::authenticate))
        .route("/api/is-authenticated", post(auth::is_authenticated))
        .route("/api/forgot-password", post(password::forgot_password))
        .route("/api/verify-reset-link", post(password::verify_reset_link))
        .route("/api/reset-password", post(password::reset_password))
        .route("/ws", get(ws::ws_endpoint))
        .merge(admin)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_drops_path() -> Result<()> {
        let origin = frontend_origin("http://localhost:4000/shop")?;
        assert_eq!(origin, "http://localhost:4000");
        Ok(())
    }

    #[test]
    fn origin_requires_host() {
        assert!(frontend_origin("mailto:admin@example.com").is_err());
    }
}
