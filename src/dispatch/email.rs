//! Email channel adapter over SMTP.

use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
};

use super::{channel::ChannelAdapter, error::DispatchError, payload::NotificationPayload};
use crate::{config::SmtpConfig, models::rule::ChannelKind};

/// Email deliveries via an async SMTP transport. Generic over the transport
/// so tests can substitute a stub.
#[derive(Debug)]
pub struct EmailAdapter<T: AsyncTransport + Send + Sync> {
    transport: Arc<T>,
    sender: Mailbox,
}

impl<T: AsyncTransport + Send + Sync> EmailAdapter<T>
where
    T::Ok: Send + Sync,
    T::Error: StdError + Send + Sync + 'static,
{
    /// Creates an adapter over an existing transport.
    pub fn with_transport(transport: T, sender: Mailbox) -> Self {
        Self { transport: Arc::new(transport), sender }
    }
}

impl EmailAdapter<AsyncSmtpTransport<Tokio1Executor>> {
    /// Creates an adapter with an SMTP relay transport built from config.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, DispatchError> {
        let sender = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::ConfigError(format!("Invalid sender address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DispatchError::ConfigError(format!("Invalid SMTP relay: {e}")))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self { transport: Arc::new(builder.build()), sender })
    }
}

#[async_trait]
impl<T: AsyncTransport + Send + Sync> ChannelAdapter for EmailAdapter<T>
where
    T::Ok: Send + Sync,
    T::Error: StdError + Send + Sync + 'static,
{
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let recipient = payload
            .destination
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::ConfigError(format!("Invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(payload.subject())
            .body(payload.body_text())
            .map_err(|e| DispatchError::InternalError(format!("Failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::DeliveryFailed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}
