//! SMTP delivery of the rendered report.

use crate::config::MailSettings;

use lettre::address::AddressError;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

const SENDER_NAME: &str = "Uptime from Prometheus";
const IMPLICIT_TLS_PORT: u16 = 465;

/// Mail error types. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid mail address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("failed to set up SMTP transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("failed to send report: {0}")]
    Send(String),
}

/// Sends HTML reports through one SMTP relay.
pub struct Mailer {
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl Mailer {
    /// Port 465 uses implicit TLS; any other port upgrades with STARTTLS
    /// when the server offers it.
    pub fn new(settings: &MailSettings, timeout: Duration) -> Result<Self, MailError> {
        let mut from = parse_mailbox(&settings.from)?;
        if from.name.is_none() {
            from.name = Some(SENDER_NAME.to_string());
        }

        let tls = TlsParameters::new(settings.host.clone())?;
        let tls = if settings.port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(tls)
        } else {
            Tls::Opportunistic(tls)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .tls(tls)
            .timeout(Some(timeout));
        if !settings.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ));
        }

        Ok(Self {
            from,
            to: parse_recipients(&settings.to)?,
            transport: builder.build(),
        })
    }

    pub fn recipients(&self) -> &[Mailbox] {
        &self.to
    }

    /// Build the HTML message for `subject`.
    pub fn message(&self, subject: &str, html: &str) -> Result<Message, MailError> {
        let builder = self
            .to
            .iter()
            .fold(Message::builder().from(self.from.clone()), |b, to| b.to(to.clone()));

        Ok(builder
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?)
    }

    pub async fn send(&self, subject: &str, html: &str) -> Result<(), MailError> {
        deliver(&self.transport, self.message(subject, html)?).await
    }
}

/// Hand one message to `transport`.
pub async fn deliver<T>(transport: &T, message: Message) -> Result<(), MailError>
where
    T: AsyncTransport + Sync,
    T::Error: Display,
{
    transport
        .send(message)
        .await
        .map(|_| ())
        .map_err(|e| MailError::Send(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.trim().parse().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

/// Split a comma-separated recipient list.
fn parse_recipients(list: &str) -> Result<Vec<Mailbox>, MailError> {
    list.split(',')
        .filter(|a| !a.trim().is_empty())
        .map(parse_mailbox)
        .collect()
}
