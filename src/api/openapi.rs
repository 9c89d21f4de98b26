use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{auth, health, password, payments, sales, users, widgets};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        widgets::get_widget,
        payments::payment_intent,
        payments::subscribe,
        auth::authenticate,
        auth::is_authenticated,
        password::forgot_password,
        password::verify_reset_link,
        password::reset_password,
        payments::virtual_terminal_succeeded,
        payments::refund,
        payments::cancel_subscription,
        sales::all_sales,
        sales::all_subscriptions,
        sales::get_sale,
        users::all_users,
        users::one_user,
        users::edit_user,
        users::delete_user,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and database status"),
        (name = "catalog", description = "Widgets for sale"),
        (name = "payments", description = "Storefront checkout"),
        (name = "auth", description = "Bearer tokens for the back office"),
        (name = "password", description = "Signed password reset links"),
        (name = "admin", description = "Back office, bearer token required"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
