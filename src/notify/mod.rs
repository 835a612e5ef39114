//! Email alerts for failed task elements

use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::NotificationConfig;
use crate::errors::EtlError;

/// SMTP-backed failure notifier.
#[derive(Clone)]
pub struct Notifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Notifier {
    pub fn from_config(config: &NotificationConfig) -> Result<Option<Self>, EtlError> {
        if !config.enabled {
            return Ok(None);
        }

        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|_| EtlError::configuration("notifications.from_address is not a valid mailbox"))?;
        let transport =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.as_str())
                .port(config.smtp_port)
                .build();

        Ok(Some(Self { transport, from }))
    }

    /// Send one alert to every address that parses; bad addresses are
    /// skipped, a transport failure is returned for the caller to log.
    pub async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), EtlError> {
        for address in to {
            let mailbox: Mailbox = match address.parse() {
                Ok(mailbox) => mailbox,
                Err(_) => {
                    debug!("Skipping invalid notification address: {address}");
                    continue;
                }
            };
            let message = Message::builder()
                .from(self.from.clone())
                .to(mailbox)
                .subject(subject)
                .body(body.to_string())
                .map_err(|e| EtlError::internal(format!("Failed to build alert email: {e}")))?;
            self.transport
                .send(message)
                .await
                .map_err(|e| EtlError::internal(format!("SMTP send failed: {e}")))?;
        }
        Ok(())
    }
}
