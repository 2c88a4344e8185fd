use crate::api::invoices::{CreateInvoice, InvoicePatch};
use crate::api::line_items::{LineItemDraft, LineItemPatch};
use crate::config::Config;
use crate::error::Error;
use crate::identity::UserId;
use crate::models::{LineItem, PopulatedInvoice};
use axum::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::{ops::Deref, sync::Arc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Per-user invoice repository.
///
/// Every method except [`InvoiceStore::get_public`] is scoped to one owner:
/// records of other owners behave exactly like missing ones. Absence is
/// `None`/`false`, `Err` is reserved for storage failures. Derived amounts
/// are recomputed by every mutation.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Creates the invoice and all of its line items, or nothing
    async fn create(
        &self,
        owner: &UserId,
        request: CreateInvoice,
    ) -> Result<PopulatedInvoice, Error>;

    async fn get(&self, owner: &UserId, id: Uuid) -> Result<Option<PopulatedInvoice>, Error>;

    /// Newest first
    async fn list(&self, owner: &UserId) -> Result<Vec<PopulatedInvoice>, Error>;

    async fn update(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: InvoicePatch,
    ) -> Result<Option<PopulatedInvoice>, Error>;

    /// Removes the invoice and its line items
    async fn delete(&self, owner: &UserId, id: Uuid) -> Result<bool, Error>;

    /// The only cross-partition read, returns hosted invoices only
    async fn get_public(&self, id: Uuid) -> Result<Option<PopulatedInvoice>, Error>;

    async fn get_by_number(
        &self,
        owner: &UserId,
        invoice_number: &str,
    ) -> Result<Option<PopulatedInvoice>, Error>;

    async fn get_line_item(&self, owner: &UserId, id: Uuid) -> Result<Option<LineItem>, Error>;

    /// `None` when the invoice does not exist for this owner
    async fn add_line_item(
        &self,
        owner: &UserId,
        invoice_id: Uuid,
        draft: LineItemDraft,
    ) -> Result<Option<LineItem>, Error>;

    async fn update_line_item(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: LineItemPatch,
    ) -> Result<Option<LineItem>, Error>;

    async fn delete_line_item(&self, owner: &UserId, id: Uuid) -> Result<bool, Error>;
}

/// Shared handle to the configured [`InvoiceStore`]
#[derive(Clone)]
pub struct Store(Arc<dyn InvoiceStore>);

impl Store {
    pub fn new(store: impl InvoiceStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Postgres when `DATABASE_URL` is set, otherwise process memory
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        match &config.database_url {
            Some(url) => {
                let store = postgres::PgStore::connect(url).await?;
                info!("Using Postgres invoice storage");
                Ok(Self::new(store))
            }
            None => {
                warn!("DATABASE_URL is not set, invoices are kept in memory only");
                Ok(Self::new(memory::MemoryStore::default()))
            }
        }
    }
}

impl Deref for Store {
    type Target = dyn InvoiceStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Store
where
    S: Send + Sync,
    Store: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Store::from_ref(state))
    }
}
