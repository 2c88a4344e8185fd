use crate::config::MailgunConfig;
use crate::error::Error;
use axum::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;

mod invoices;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Mail transport, failures are reported as downstream errors
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), Error>;
}

/// Shared handle to the configured [`Mailer`]
#[derive(Clone)]
pub struct Outbox(Arc<dyn Mailer>);

impl Outbox {
    pub fn new(mailer: impl Mailer + 'static) -> Self {
        Self(Arc::new(mailer))
    }

    pub fn from_config(config: Option<&MailgunConfig>) -> Self {
        match config {
            Some(config) => Self::new(MailgunClient::new(config.clone())),
            None => {
                warn!("Mailgun is not configured, sending invoices by email is disabled");
                Self::new(Disabled)
            }
        }
    }

    pub async fn send(&self, mail: OutgoingMail) -> Result<(), Error> {
        self.0.send(mail).await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Outbox
where
    S: Send + Sync,
    Outbox: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Outbox::from_ref(state))
    }
}

#[derive(Clone)]
pub struct MailgunClient {
    pub client: reqwest::Client,
    pub url: String,
    pub api_user: String,
    pub api_key: String,
    pub from: String,
}

impl MailgunClient {
    pub fn new(config: MailgunConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url,
            api_user: config.api_user,
            api_key: config.api_key,
            from: config.from,
        }
    }
}

#[async_trait]
impl Mailer for MailgunClient {
    async fn send(&self, mail: OutgoingMail) -> Result<(), Error> {
        let form = reqwest::multipart::Form::new()
            .text("from", self.from.clone())
            .text("to", mail.to)
            .text("subject", mail.subject)
            .text("text", mail.text)
            .text("html", mail.html);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.api_user, Some(&self.api_key))
            .multipart(form)
            .send()
            .await?;

        match response.error_for_status() {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::ReqwestError(e)),
        }
    }
}

/// Used when no transport is configured
struct Disabled;

#[async_trait]
impl Mailer for Disabled {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), Error> {
        Err(Error::MailNotConfigured)
    }
}
