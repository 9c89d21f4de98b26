//! Built-in email templates, selected by name.

use serde_json::Value;

use super::MailError;

pub const PASSWORD_RESET: &str = "password-reset";
pub const INVOICE: &str = "invoice";

/// Rendered bodies of one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub text: String,
    pub html: String,
}

/// Render template `name` with the fields of `data`.
///
/// # Errors
/// `UnknownTemplate` for an unregistered name, `Template` when a field is missing.
pub fn render(name: &str, data: &Value) -> Result<Content, MailError> {
    match name {
        PASSWORD_RESET => Ok(password_reset(field(name, data, "link")?)),
        INVOICE => Ok(invoice(
            field(name, data, "first_name")?,
            field(name, data, "order_id")?,
        )),
        other => Err(MailError::UnknownTemplate(other.to_string())),
    }
}

fn field(template: &str, data: &Value, key: &str) -> Result<String, MailError> {
    match data.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(Value::Number(value)) => Ok(value.to_string()),
        _ => Err(MailError::Template(format!(
            "template {template} requires field `{key}`"
        ))),
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn password_reset(link: String) -> Content {
    let text = format!(
        r"Hello,

You requested a password reset. Open the link below to choose a new password:

{link}

The link is valid for 60 minutes. If you did not ask for a reset, ignore this email.

--
Widgets"
    );
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body>
    <p>Hello,</p>
    <p>You requested a password reset. Click the link below to choose a new password:</p>
    <p><a href="{href}">Reset password</a></p>
    <p>The link is valid for 60 minutes. If you did not ask for a reset, ignore this email.</p>
    <p>--<br>Widgets</p>
</body>
</html>"#,
        href = escape_html(&link)
    );
    Content { text, html }
}

fn invoice(first_name: String, order_id: String) -> Content {
    let text = format!(
        r"Hello {first_name},

Thank you for your order. Your invoice for order {order_id} is attached.

--
Widgets"
    );
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body>
    <p>Hello {name},</p>
    <p>Thank you for your order. Your invoice for order {order_id} is attached.</p>
    <p>--<br>Widgets</p>
</body>
</html>"#,
        name = escape_html(&first_name)
    );
    Content { text, html }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn password_reset_contains_link() -> Result<(), MailError> {
        let link = "http://localhost:4000/reset-password?email=x&timestamp=1&signature=ab";
        let content = render(PASSWORD_RESET, &json!({ "link": link }))?;
        assert!(content.text.contains(link));
        assert!(content.html.contains("email=x&amp;timestamp=1"));
        Ok(())
    }

    #[test]
    fn invoice_accepts_numeric_order_id() -> Result<(), MailError> {
        let content = render(INVOICE, &json!({ "first_name": "Ada", "order_id": 17 }))?;
        assert!(content.text.contains("Hello Ada"));
        assert!(content.text.contains("order 17"));
        Ok(())
    }

    #[test]
    fn missing_field_is_an_error() {
        assert!(matches!(
            render(PASSWORD_RESET, &json!({})),
            Err(MailError::Template(_))
        ));
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(matches!(
            render("welcome", &json!({})),
            Err(MailError::UnknownTemplate(_))
        ));
    }
}
