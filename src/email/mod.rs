//! Outgoing SMTP mail.

use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use log::{error, info};

use crate::core::config::EmailConfig;
use crate::core::shared::{AppError, AppResult};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("invalid attachment content type '{0}'")]
    ContentType(String),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

impl From<EmailError> for AppError {
    fn from(e: EmailError) -> Self {
        match e {
            EmailError::Address(addr) => AppError::field("email", format!("'{addr}' is not a valid address")),
            other => AppError::External(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct Mailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer").field("from", &self.from.to_string()).finish()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .trim()
        .parse()
        .map_err(|_| EmailError::Address(address.to_string()))
}

impl Mailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let from = parse_mailbox(&config.from)?;
        let transport = if config.username.is_empty() {
            SmtpTransport::builder_dangerous(&config.smtp_server)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            let builder = if config.smtp_port == 465 {
                SmtpTransport::relay(&config.smtp_server)?
            } else {
                SmtpTransport::starttls_relay(&config.smtp_server)?
            };
            builder.port(config.smtp_port).credentials(creds).build()
        };
        Ok(Self { transport, from })
    }

    pub fn build_message(
        &self,
        to: &str,
        subject: &str,
        body: String,
        attachment: Option<EmailAttachment>,
    ) -> Result<Message, EmailError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject);

        let message = match attachment {
            None => builder.header(ContentType::TEXT_PLAIN).body(body)?,
            Some(file) => {
                let content_type = ContentType::parse(&file.content_type)
                    .map_err(|_| EmailError::ContentType(file.content_type.clone()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body))
                        .singlepart(Attachment::new(file.file_name).body(file.data, content_type)),
                )?
            }
        };
        Ok(message)
    }

    /// Sends on the blocking pool; SMTP I/O is synchronous.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: String,
        attachment: Option<EmailAttachment>,
    ) -> AppResult<()> {
        let message = self.build_message(to, subject, body, attachment)?;
        let transport = self.transport.clone();
        let recipient = to.to_string();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await?
            .map_err(|e| {
                error!("Failed to send email to {}: {}", recipient, e);
                AppError::from(EmailError::Smtp(e))
            })?;

        info!("Email '{}' sent to {}", subject, to);
        Ok(())
    }
}
