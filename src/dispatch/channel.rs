use crate::error::DispatchError;
use async_trait::async_trait;
use std::fmt::{self, Display, Formatter};

/// One of the four outbound notification destinations (spec.md §3, §6).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Discord,
    Telegram,
    Email,
    Webhook,
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelKind::Discord => "discord",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        };
        write!(f, "{s}")
    }
}

/// A pre-formatted notification payload ready to hand to a
/// [`ChannelSender`]. Templating itself is out of scope (spec.md §1);
/// this is the narrow contract the dispatcher invokes through.
#[derive(Clone, Debug)]
pub struct NotificationPayload {
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// The four outbound send primitives of spec.md §6, as an opaque,
/// cancellable contract. All failures are classified transient or
/// terminal by the implementor; the dispatcher never inspects transport
/// internals (non-2xx HTTP, network errors, and SMTP errors are all
/// transient per spec.md §6).
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_chat_webhook(&self, url: &str, payload: &NotificationPayload) -> Result<(), DispatchError>;

    async fn send_chat_bot(&self, token: &str, chat: &str, text: &str) -> Result<(), DispatchError>;

    async fn send_email(
        &self,
        server: &str,
        username: &str,
        password: &str,
        to: &str,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError>;

    async fn send_http_webhook(
        &self,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        body: &str,
    ) -> Result<(), DispatchError>;
}

/// Default thin adapter over `reqwest`/`lettre`. Network and SMTP
/// errors, and non-2xx HTTP responses, are surfaced as transient per
/// spec.md §6; a 4xx indicating a malformed payload (400/422) is
/// terminal per spec.md §7.
#[derive(Clone, Default)]
pub struct HttpChannelSender {
    client: reqwest::Client,
}

impl HttpChannelSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn classify_status(status: reqwest::StatusCode) -> Result<(), DispatchError> {
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(DispatchError::Terminal(format!("bad payload: {status}")));
        }
        Err(DispatchError::Transient(format!("non-2xx response: {status}")))
    }
}

#[async_trait]
impl ChannelSender for HttpChannelSender {
    async fn send_chat_webhook(&self, url: &str, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let body = serde_json::json!({ "content": payload.text });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        Self::classify_status(response.status())
    }

    async fn send_chat_bot(&self, token: &str, chat: &str, text: &str) -> Result<(), DispatchError> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({ "chat_id": chat, "text": text });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        Self::classify_status(response.status())
    }

    async fn send_email(
        &self,
        server: &str,
        username: &str,
        password: &str,
        to: &str,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        use lettre::message::{Message, MultiPart, SinglePart};
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

        let body = match &payload.html {
            Some(html) => MultiPart::alternative()
                .singlepart(SinglePart::plain(payload.text.clone()))
                .singlepart(SinglePart::html(html.clone())),
            None => MultiPart::mixed().singlepart(SinglePart::plain(payload.text.clone())),
        };

        let email = Message::builder()
            .from(username.parse().map_err(|err: lettre::address::AddressError| {
                DispatchError::Terminal(err.to_string())
            })?)
            .to(to.parse().map_err(|err: lettre::address::AddressError| {
                DispatchError::Terminal(err.to_string())
            })?)
            .subject(&payload.subject)
            .multipart(body)
            .map_err(|err| DispatchError::Terminal(err.to_string()))?;

        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(server)
                .map_err(|err| DispatchError::Transient(err.to_string()))?
                .credentials(creds)
                .build();

        transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|err| DispatchError::Transient(err.to_string()))
    }

    async fn send_http_webhook(
        &self,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        body: &str,
    ) -> Result<(), DispatchError> {
        let mut request = self.client.post(url).body(body.to_owned());
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request
            .send()
            .await
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        Self::classify_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        struct TestCase {
            status: reqwest::StatusCode,
            expect_terminal: Option<bool>,
        }

        let cases = vec![
            TestCase { status: reqwest::StatusCode::OK, expect_terminal: None },
            TestCase { status: reqwest::StatusCode::BAD_REQUEST, expect_terminal: Some(true) },
            TestCase { status: reqwest::StatusCode::UNPROCESSABLE_ENTITY, expect_terminal: Some(true) },
            TestCase { status: reqwest::StatusCode::INTERNAL_SERVER_ERROR, expect_terminal: Some(false) },
            TestCase { status: reqwest::StatusCode::TOO_MANY_REQUESTS, expect_terminal: Some(false) },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            match (HttpChannelSender::classify_status(test.status), test.expect_terminal) {
                (Ok(()), None) => {}
                (Err(err), Some(terminal)) => {
                    assert_eq!(err.is_terminal(), terminal, "TC{index} failed");
                }
                (actual, expected) => panic!("TC{index} failed: {actual:?} vs terminal={expected:?}"),
            }
        }
    }
}
