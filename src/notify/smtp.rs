// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! SMTP notifier implementation.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use lettre::{
    message::{header::ContentType, Attachment, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;

use super::{Notifier, NotifyError, UnlockNotification};

/// SMTP transport for unlock notifications.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    /// Build a notifier from SMTP settings.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS when TLS is
    /// enabled. `timeout` bounds each send at the socket level.
    pub fn new(
        config: &SmtpConfig,
        from_address: &str,
        from_name: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let mut builder = if config.use_tls {
            let tls_params = TlsParameters::new(config.host.clone())
                .map_err(|e| NotifyError::InvalidConfig(format!("TLS configuration: {e}")))?;

            if config.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|e| NotifyError::InvalidConfig(format!("SMTP relay: {e}")))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| NotifyError::InvalidConfig(format!("SMTP relay: {e}")))?
                    .port(config.port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        builder = builder.timeout(Some(timeout));

        if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        let from = if from_name.is_empty() {
            from_address.to_string()
        } else {
            format!("{from_name} <{from_address}>")
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &UnlockNotification) -> Result<(), NotifyError> {
        let bodies = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(notification.text.clone()),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(notification.html.clone()),
            );

        // An unparseable attachment must not drop the message itself; the
        // email goes out without it and the anomaly is logged.
        let attachment_part = notification
            .attachment
            .as_deref()
            .and_then(|payload| match decode_data_uri(payload) {
                Some(part) => Some(part),
                None => {
                    tracing::warn!(
                        to = %notification.to,
                        "attachment payload is not a decodable data URI; sending without it"
                    );
                    None
                }
            });

        let body = match attachment_part {
            Some(attachment) => MultiPart::mixed().multipart(bodies).singlepart(attachment),
            None => bodies,
        };

        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::InvalidConfig(format!("invalid from address: {e}")))?,
            )
            .to(notification
                .to
                .parse()
                .map_err(|e| NotifyError::SendFailed(format!("invalid recipient address: {e}")))?)
            .subject(notification.subject.clone())
            .multipart(body)
            .map_err(|e| NotifyError::SendFailed(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::SendFailed(e.to_string()))
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI into an inline attachment.
fn decode_data_uri(payload: &str) -> Option<SinglePart> {
    let rest = payload.strip_prefix("data:")?;
    let (mime, body) = rest.split_once(";base64,")?;
    let bytes = Base64::decode_vec(body).ok()?;
    let content_type = ContentType::parse(mime).ok()?;

    // Inline with content id "memory" so the HTML body can reference it.
    Some(Attachment::new_inline("memory".to_string()).body(bytes, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config(port: u16, use_tls: bool) -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port,
            username: None,
            password: None,
            use_tls,
        }
    }

    #[test]
    fn notifier_builds_without_tls() {
        let notifier = SmtpNotifier::new(
            &smtp_config(25, false),
            "no-reply@example.com",
            "GhostPost",
            Duration::from_secs(15),
        );
        assert!(notifier.is_ok());
    }

    #[test]
    fn notifier_builds_with_starttls_and_credentials() {
        let mut config = smtp_config(587, true);
        config.username = Some("user".to_string());
        config.password = Some("pass".to_string());
        let notifier = SmtpNotifier::new(&config, "no-reply@example.com", "", Duration::from_secs(15));
        assert!(notifier.is_ok());
    }

    #[test]
    fn data_uri_decodes_to_attachment() {
        assert!(decode_data_uri("data:image/png;base64,aGVsbG8=").is_some());
        assert!(decode_data_uri("https://cdn.example/x.png").is_none());
        assert!(decode_data_uri("data:image/png;base64,!!!").is_none());
    }
}
