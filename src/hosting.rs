use crate::api::invoices::InvoicePatch;
use crate::database::Store;
use crate::error::Error;
use crate::identity::UserId;
use axum::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use qrcode::{render::svg, QrCode};
use uuid::Uuid;

/// Mints the shareable URLs of hosted invoices
#[derive(Clone, Debug)]
pub struct Hosting {
    base_url: String,
}

impl Hosting {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, id: Uuid) -> String {
        format!("{}/view/{}", self.base_url, id)
    }

    /// Turns hosting on for an owned invoice and returns its URL. Repeated
    /// calls return the same URL and leave the record untouched.
    pub async fn publish(&self, store: &Store, owner: &UserId, id: Uuid) -> Result<String, Error> {
        let invoice = store
            .get(owner, id)
            .await?
            .ok_or(Error::NotFound("Invoice"))?;

        let url = self.url_for(id);
        if invoice.invoice.is_hosted && invoice.invoice.hosted_url.as_deref() == Some(url.as_str())
        {
            return Ok(url);
        }

        store
            .update(owner, id, InvoicePatch::hosting(url.clone()))
            .await?
            .ok_or(Error::NotFound("Invoice"))?;
        info!(%owner, %id, %url, "invoice hosted");

        Ok(url)
    }
}

/// Scannable SVG of a hosted URL
pub fn qr_svg(url: &str) -> Result<String, Error> {
    let code = QrCode::new(url.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .quiet_zone(true)
        .build())
}

#[async_trait]
impl<S> FromRequestParts<S> for Hosting
where
    S: Send + Sync,
    Hosting: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Hosting::from_ref(state))
    }
}
