use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use storeai_kernel::report::RenderedReport;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {address}: {message}")]
    Address { address: String, message: String },
    #[error("build message failed: {0}")]
    Build(String),
    #[error("smtp transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct MailCredentials {
    pub sender: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingMail {
    pub fn from_report(to: &str, report: RenderedReport) -> Self {
        Self {
            to: to.to_string(),
            subject: report.subject,
            text: report.text,
            html: report.html,
        }
    }
}

/// Delivers a rendered report. The server holds one behind an `Arc` so tests
/// can swap in a recorder.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, credentials: &MailCredentials, mail: &OutgoingMail)
        -> Result<(), MailError>;
}

/// Authenticated SMTP submission over STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        credentials: &MailCredentials,
        mail: &OutgoingMail,
    ) -> Result<(), MailError> {
        let message = build_message(&credentials.sender, mail)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(
                credentials.sender.clone(),
                credentials.password.clone(),
            ))
            .build();
        transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!(to = %mail.to, host = %self.host, "report mailed");
        Ok(())
    }
}

pub fn build_message(sender: &str, mail: &OutgoingMail) -> Result<Message, MailError> {
    Message::builder()
        .from(parse_mailbox(sender)?)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            mail.text.clone(),
            mail.html.clone(),
        ))
        .map_err(|e| MailError::Build(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address {
            address: address.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "StoreAI triage report: 1 issue(s)".to_string(),
            text: "plain".to_string(),
            html: "<p>html</p>".to_string(),
        }
    }

    #[test]
    fn builds_multipart_message() {
        let message = build_message("bot@example.com", &mail("ops@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: StoreAI triage report: 1 issue(s)"));
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn rejects_malformed_receiver() {
        let err = build_message("bot@example.com", &mail("not an address")).unwrap_err();
        assert!(matches!(err, MailError::Address { .. }));
    }
}
