use async_trait::async_trait;

use super::RenderedMessage;

/// A message could not be delivered. Scoped to one entity: the caller keeps
/// that entity's ledger advances uncommitted so the next run retries.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),
}

/// Delivery interface the dispatcher hands rendered messages to.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError>;
}

/// Sends notification mail through an SMTP relay.
pub struct SmtpMailer {
    host: String,
    port: u16,
}

impl SmtpMailer {
    /// An empty host selects the local platform transport; port zero selects
    /// the standard SMTP port.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: if host.is_empty() {
                "localhost".to_string()
            } else {
                host.to_string()
            },
            port: if port == 0 { 25 } else { port },
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        use lettre::message::header::ContentType;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

        let email = Message::builder()
            .from(message.from.parse()?)
            .to(message.to.parse()?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.host.as_str())
            .port(self.port)
            .build();
        transport.send(email).await?;

        tracing::info!(to = %message.to, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host_uses_local_transport() {
        let mailer = SmtpMailer::new("", 0);
        assert_eq!(mailer.host, "localhost");
        assert_eq!(mailer.port, 25);
    }

    #[test]
    fn test_configured_endpoint_kept() {
        let mailer = SmtpMailer::new("mail.example.org", 2525);
        assert_eq!(mailer.host, "mail.example.org");
        assert_eq!(mailer.port, 2525);
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "email build error: missing body");
    }
}
