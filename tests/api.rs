use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use widgets::{
    api::{self, ApiConfig, AppState, Services},
    auth::password::hash_password,
    invoice::{InvoiceError, InvoiceOrder, InvoiceSender},
    mailer::{MailError, Mailer, OutboxMailer, OutgoingEmail},
    payments::{
        PaymentError, PaymentIntent, PaymentMethod, PaymentProcessor, ProcessorCustomer,
        Subscription,
    },
    storage::{
        models::{NewUser, Widget},
        MemoryStore, UserStore,
    },
};

const SECRET: &[u8] = b"abcdefghijklmnopqrstuvwxyz012345";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "password";

#[derive(Default)]
struct FakeProcessor;

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_payment_intent(
        &self,
        currency: &str,
        amount: i64,
    ) -> Result<PaymentIntent, PaymentError> {
        Ok(PaymentIntent {
            id: "pi_1".to_string(),
            amount,
            currency: currency.to_string(),
            status: "requires_payment_method".to_string(),
            client_secret: Some("pi_1_secret".to_string()),
            latest_charge: None,
        })
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        Err(PaymentError::InvalidRequest(format!("No such payment_intent: {id}")))
    }

    async fn get_payment_method(&self, id: &str) -> Result<PaymentMethod, PaymentError> {
        Ok(PaymentMethod {
            id: id.to_string(),
            card: None,
        })
    }

    async fn create_customer(
        &self,
        _payment_method: &str,
        email: &str,
    ) -> Result<ProcessorCustomer, PaymentError> {
        Ok(ProcessorCustomer {
            id: "cus_1".to_string(),
            email: Some(email.to_string()),
        })
    }

    async fn subscribe_to_plan(
        &self,
        _customer: &ProcessorCustomer,
        _plan: &str,
        _last_four: &str,
        _card_type: &str,
    ) -> Result<Subscription, PaymentError> {
        Ok(Subscription {
            id: "sub_1".to_string(),
            status: "active".to_string(),
        })
    }

    async fn refund(&self, _payment_intent: &str, _amount: i64) -> Result<(), PaymentError> {
        Ok(())
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<(), PaymentError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingInvoices {
    sent: Mutex<Vec<InvoiceOrder>>,
}

#[async_trait]
impl InvoiceSender for RecordingInvoices {
    async fn send_invoice(&self, order: &InvoiceOrder) -> Result<(), InvoiceError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(order.clone());
        }
        Ok(())
    }
}

struct DownMailer;

#[async_trait]
impl Mailer for DownMailer {
    async fn deliver(&self, _email: OutgoingEmail) -> Result<(), MailError> {
        Err(MailError::SendFailed("connection refused".to_string()))
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
    outbox: Arc<OutboxMailer>,
    invoices: Arc<RecordingInvoices>,
}

impl TestApp {
    async fn new() -> Result<Self> {
        Self::with_mailer(None).await
    }

    async fn with_mailer(mailer: Option<Arc<dyn Mailer>>) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(NewUser {
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password_hash: hash_password(ADMIN_PASSWORD)?,
            })
            .await?;
        store
            .insert_widget(Widget {
                name: "Bronze Plan".to_string(),
                price: 2000,
                is_recurring: true,
                plan_id: "price_bronze".to_string(),
                ..Widget::default()
            })
            .await;

        let outbox = Arc::new(OutboxMailer::new());
        let invoices = Arc::new(RecordingInvoices::default());
        let state = Arc::new(AppState::new(
            store.clone(),
            SECRET,
            Services {
                mailer: mailer.unwrap_or_else(|| outbox.clone() as Arc<dyn Mailer>),
                payments: Arc::new(FakeProcessor),
                invoices: invoices.clone(),
            },
            ApiConfig::new(),
        )?);

        Ok(Self {
            router: api::router(state.clone())?,
            state,
            store,
            outbox,
            invoices,
        })
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => request.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<String> {
        let (status, body) = self
            .post(
                "/api/authenticate",
                None,
                json!({ "email": email, "password": password }),
            )
            .await?;
        ensure!(status == StatusCode::OK, "login failed: {status} {body}");
        body["authentication_token"]["token"]
            .as_str()
            .map(str::to_string)
            .context("token missing from login response")
    }
}

fn link_from_mail(text: &str) -> Result<String> {
    text.split_whitespace()
        .find(|word| word.starts_with("http://localhost:4000/reset-password?"))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no reset link in mail: {text}"))
}

#[tokio::test]
async fn login_issues_usable_token() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    ensure!(token.len() == 26);

    let (status, body) = app
        .post("/api/is-authenticated", Some(&token), json!({}))
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["error"] == false);
    ensure!(body["message"] == format!("Authenticated user: {ADMIN_EMAIL}"));
    Ok(())
}

#[tokio::test]
async fn bad_credentials_get_generic_401() -> Result<()> {
    let app = TestApp::new().await?;

    for (email, password) in [
        (ADMIN_EMAIL, "wrong"),
        ("nobody@example.com", ADMIN_PASSWORD),
    ] {
        let (status, body) = app
            .post(
                "/api/authenticate",
                None,
                json!({ "email": email, "password": password }),
            )
            .await?;
        ensure!(status == StatusCode::UNAUTHORIZED);
        ensure!(body["error"] == true);
        ensure!(body["message"] == api::error::MSG_INVALID_CREDENTIALS);
    }
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_token() -> Result<()> {
    let app = TestApp::new().await?;
    let page = json!({ "page_size": 10, "current_page": 1 });

    let (status, _) = app.post("/api/admin/all-users", None, page.clone()).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/admin/all-users",
            Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            page.clone(),
        )
        .await?;
    ensure!(status == StatusCode::UNAUTHORIZED);

    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let (status, body) = app.post("/api/admin/all-users", Some(&token), page).await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["total_records"] == 1);
    ensure!(body["page_data"][0]["email"] == ADMIN_EMAIL);
    ensure!(body["page_data"][0].get("password_hash").is_none());
    Ok(())
}

#[tokio::test]
async fn oversized_paging_window_is_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let page = json!({ "page_size": 4_611_686_018_427_387_904_i64, "current_page": 3 });

    for path in [
        "/api/admin/all-sales",
        "/api/admin/all-subscriptions",
        "/api/admin/all-users",
    ] {
        let (status, body) = app.post(path, Some(&token), page.clone()).await?;
        ensure!(status == StatusCode::BAD_REQUEST, "{path}: {status}");
        ensure!(body["error"] == true);
    }

    let (status, _) = app
        .post(
            "/api/admin/all-users",
            Some(&token),
            json!({ "page_size": i64::MAX, "current_page": 1 }),
        )
        .await?;
    ensure!(status == StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn second_login_revokes_first_token() -> Result<()> {
    let app = TestApp::new().await?;
    let first = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let second = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (status, _) = app
        .post("/api/is-authenticated", Some(&first), json!({}))
        .await?;
    ensure!(status == StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/is-authenticated", Some(&second), json!({}))
        .await?;
    ensure!(status == StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn password_reset_flow() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post("/api/forgot-password", None, json!({ "email": ADMIN_EMAIL }))
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["error"] == false);

    let sent = app.outbox.sent();
    ensure!(sent.len() == 1);
    ensure!(sent[0].to == ADMIN_EMAIL);
    ensure!(sent[0].subject == "Password Reset Link");
    let link = link_from_mail(&sent[0].text)?;
    ensure!(!link.contains("admin%40example.com") && !link.contains(ADMIN_EMAIL));

    let (status, body) = app
        .post("/api/verify-reset-link", None, json!({ "link": link }))
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["email"] == ADMIN_EMAIL);

    let (status, _) = app
        .post(
            "/api/reset-password",
            None,
            json!({ "link": link, "password": "new-password" }),
        )
        .await?;
    ensure!(status == StatusCode::OK);

    app.login(ADMIN_EMAIL, "new-password").await?;
    let (status, _) = app
        .post(
            "/api/authenticate",
            None,
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unknown_email_gets_same_answer_without_mail() -> Result<()> {
    let app = TestApp::new().await?;

    let (known_status, known) = app
        .post("/api/forgot-password", None, json!({ "email": ADMIN_EMAIL }))
        .await?;
    let (unknown_status, unknown) = app
        .post(
            "/api/forgot-password",
            None,
            json!({ "email": "nobody@example.com" }),
        )
        .await?;

    ensure!(known_status == unknown_status);
    ensure!(known == unknown);
    ensure!(app.outbox.sent().len() == 1);
    Ok(())
}

#[tokio::test]
async fn failed_reset_mail_gets_same_answer() -> Result<()> {
    let app = TestApp::with_mailer(Some(Arc::new(DownMailer))).await?;

    let (known_status, known) = app
        .post("/api/forgot-password", None, json!({ "email": ADMIN_EMAIL }))
        .await?;
    let (unknown_status, unknown) = app
        .post(
            "/api/forgot-password",
            None,
            json!({ "email": "nobody@example.com" }),
        )
        .await?;

    ensure!(known_status == StatusCode::OK, "{known_status} {known}");
    ensure!(known_status == unknown_status);
    ensure!(known == unknown);
    Ok(())
}

#[tokio::test]
async fn tampered_reset_link_is_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    app.post("/api/forgot-password", None, json!({ "email": ADMIN_EMAIL }))
        .await?;
    let link = link_from_mail(&app.outbox.sent()[0].text)?;
    let tampered = link.replacen("reset-password", "reset-passw0rd", 1);

    for body in [
        json!({ "link": tampered }),
        json!({ "link": tampered, "password": "hijacked" }),
    ] {
        let uri = if body.get("password").is_some() {
            "/api/reset-password"
        } else {
            "/api/verify-reset-link"
        };
        let (status, body) = app.post(uri, None, body).await?;
        ensure!(status == StatusCode::UNAUTHORIZED, "{uri} gave {status}");
        ensure!(body["error"] == true);
    }

    app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    Ok(())
}

#[tokio::test]
async fn deleting_a_user_logs_them_out_everywhere() -> Result<()> {
    let app = TestApp::new().await?;
    let victim = app
        .store
        .insert_user(NewUser {
            first_name: "Eve".to_string(),
            last_name: "Example".to_string(),
            email: "eve@example.com".to_string(),
            password_hash: hash_password("eve-password")?,
        })
        .await?;
    let victim_token = app.login("eve@example.com", "eve-password").await?;
    let admin_token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (_client, mut rx) = app.state.hub.register().await;

    let (status, body) = app
        .post(
            &format!("/api/admin/all-users/delete/{victim}"),
            Some(&admin_token),
            json!({}),
        )
        .await?;
    ensure!(status == StatusCode::OK, "{status} {body}");

    let pushed = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await?
        .context("hub closed")?;
    ensure!(pushed.action == "logout");
    ensure!(pushed.user_id == victim);

    let (status, _) = app
        .post("/api/is-authenticated", Some(&victim_token), json!({}))
        .await?;
    ensure!(status == StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            &format!("/api/admin/all-users/delete/{victim}"),
            Some(&admin_token),
            json!({}),
        )
        .await?;
    ensure!(status == StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn creating_user_validates_fields() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (status, body) = app
        .post(
            "/api/admin/all-users/edit/0",
            Some(&token),
            json!({ "first_name": "Ada", "email": "not-an-email" }),
        )
        .await?;
    ensure!(status == StatusCode::UNPROCESSABLE_ENTITY);
    ensure!(body["error"] == true);
    ensure!(body["errors"]["email"].is_string());
    ensure!(body["errors"]["last_name"].is_string());
    ensure!(body["errors"]["password"].is_string());

    let (status, _) = app
        .post(
            "/api/admin/all-users/edit/0",
            Some(&token),
            json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "password": "analytical",
            }),
        )
        .await?;
    ensure!(status == StatusCode::CREATED);
    app.login("ada@example.com", "analytical").await?;
    Ok(())
}

#[tokio::test]
async fn subscription_checkout_records_order() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post(
            "/api/create-customer-and-subscribe-to-plan",
            None,
            json!({
                "currency": "usd",
                "amount": "2000",
                "payment_method": "pm_card_visa",
                "email": "buyer@example.com",
                "card_brand": "visa",
                "exp_month": 12,
                "exp_year": 2030,
                "last_four": "4242",
                "plan": "price_bronze",
                "product_id": "1",
                "first_name": "Buyer",
                "last_name": "Example",
            }),
        )
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["ok"] == true, "{body}");

    let invoices = app
        .invoices
        .sent
        .lock()
        .map_err(|_| anyhow!("poisoned"))?
        .clone();
    ensure!(invoices.len() == 1);
    ensure!(invoices[0].product == "Bronze Plan");
    ensure!(invoices[0].email == "buyer@example.com");

    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let (status, body) = app
        .post(
            "/api/admin/all-subscriptions",
            Some(&token),
            json!({ "page_size": 5, "current_page": 1 }),
        )
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["total_records"] == 1);

    let (status, body) = app
        .post("/api/admin/all-sales", Some(&token), json!({ "page_size": 5, "current_page": 1 }))
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["total_records"] == 0);
    Ok(())
}

#[tokio::test]
async fn payment_intent_and_catalog() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post(
            "/api/payment-intent",
            None,
            json!({ "currency": "usd", "amount": "2000" }),
        )
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["client_secret"] == "pi_1_secret", "{body}");

    let (status, _) = app
        .post(
            "/api/payment-intent",
            None,
            json!({ "currency": "usd", "amount": "twenty" }),
        )
        .await?;
    ensure!(status == StatusCode::BAD_REQUEST);

    let (status, body) = app.call(Method::GET, "/api/widget/1", None, None).await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["name"] == "Bronze Plan");

    let (status, _) = app.call(Method::GET, "/api/widget/99", None, None).await?;
    ensure!(status == StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn health_and_openapi_are_public() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.call(Method::GET, "/health", None, None).await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["name"] == env!("CARGO_PKG_NAME"));

    let (status, body) = app
        .call(Method::GET, "/api-docs/openapi.json", None, None)
        .await?;
    ensure!(status == StatusCode::OK);
    ensure!(body["paths"]["/api/authenticate"].is_object());
    Ok(())
}
