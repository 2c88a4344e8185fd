use super::InvoiceStore;
use crate::api::invoices::{CreateInvoice, InvoicePatch};
use crate::api::line_items::{LineItemDraft, LineItemPatch};
use crate::error::Error;
use crate::identity::UserId;
use crate::models::{Invoice, LineItem, PopulatedInvoice};
use crate::schema::{invoices, line_items};
use axum::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::AsyncDieselConnectionManager, scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Postgres backed storage, the owner is a tenant column on both tables
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = bb8::Pool::builder().build(manager).await?;
        Ok(Self { pool })
    }
}

async fn items_of(conn: &mut AsyncPgConnection, invoice_id: Uuid) -> Result<Vec<LineItem>, Error> {
    Ok(line_items::table
        .filter(line_items::invoice_id.eq(invoice_id))
        .order(line_items::position.asc())
        .select(LineItem::as_select())
        .load(conn)
        .await?)
}

/// Locks an owned invoice row until the transaction ends
async fn lock_invoice(
    conn: &mut AsyncPgConnection,
    owner: &UserId,
    id: Uuid,
) -> Result<Option<Invoice>, Error> {
    Ok(invoices::table
        .filter(invoices::id.eq(id))
        .filter(invoices::owner_id.eq(owner.as_str()))
        .select(Invoice::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?)
}

/// Rewrites the derived amounts of a locked invoice from its line items.
/// Totals that no longer fit fail the whole transaction.
async fn refresh_totals(conn: &mut AsyncPgConnection, mut invoice: Invoice) -> Result<(), Error> {
    let items = items_of(conn, invoice.id).await?;
    invoice.recompute(&items);
    invoice.check()?;

    diesel::update(invoices::table.find(invoice.id))
        .set((
            invoices::subtotal.eq(invoice.subtotal),
            invoices::tax.eq(invoice.tax),
            invoices::total.eq(invoice.total),
            invoices::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

    Ok(())
}

async fn populate(
    conn: &mut AsyncPgConnection,
    invoice: Option<Invoice>,
) -> Result<Option<PopulatedInvoice>, Error> {
    let Some(invoice) = invoice else {
        return Ok(None);
    };
    let line_items = items_of(conn, invoice.id).await?;
    Ok(Some(PopulatedInvoice {
        invoice,
        line_items,
    }))
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn create(
        &self,
        owner: &UserId,
        request: CreateInvoice,
    ) -> Result<PopulatedInvoice, Error> {
        let created = PopulatedInvoice::build(owner, request, Utc::now());
        let record = &created;

        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                diesel::insert_into(invoices::table)
                    .values(&record.invoice)
                    .execute(conn)
                    .await?;
                diesel::insert_into(line_items::table)
                    .values(&record.line_items)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(created)
    }

    async fn get(&self, owner: &UserId, id: Uuid) -> Result<Option<PopulatedInvoice>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        let invoice = invoices::table
            .filter(invoices::id.eq(id))
            .filter(invoices::owner_id.eq(owner.as_str()))
            .select(Invoice::as_select())
            .first(conn)
            .await
            .optional()?;

        populate(conn, invoice).await
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<PopulatedInvoice>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        let found = invoices::table
            .filter(invoices::owner_id.eq(owner.as_str()))
            .order(invoices::created_at.desc())
            .select(Invoice::as_select())
            .load(conn)
            .await?;
        let ids = found.iter().map(|invoice| invoice.id).collect::<Vec<_>>();
        let items = line_items::table
            .filter(line_items::invoice_id.eq_any(ids))
            .select(LineItem::as_select())
            .load(conn)
            .await?;

        Ok(PopulatedInvoice::group(found, items))
    }

    async fn update(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: InvoicePatch,
    ) -> Result<Option<PopulatedInvoice>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let Some(mut invoice) = lock_invoice(conn, owner, id).await? else {
                    return Ok(None);
                };
                let line_items = items_of(conn, id).await?;

                invoice.apply(patch, Utc::now());
                invoice.recompute(&line_items);
                invoice.check()?;
                diesel::update(invoices::table.find(id))
                    .set(&invoice)
                    .execute(conn)
                    .await?;

                Ok(Some(PopulatedInvoice {
                    invoice,
                    line_items,
                }))
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete(&self, owner: &UserId, id: Uuid) -> Result<bool, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        // line items go with the invoice through the foreign key
        let deleted = diesel::delete(
            invoices::table
                .filter(invoices::id.eq(id))
                .filter(invoices::owner_id.eq(owner.as_str())),
        )
        .execute(conn)
        .await?;

        Ok(deleted > 0)
    }

    async fn get_public(&self, id: Uuid) -> Result<Option<PopulatedInvoice>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        let invoice = invoices::table
            .filter(invoices::id.eq(id))
            .filter(invoices::is_hosted.eq(true))
            .select(Invoice::as_select())
            .first(conn)
            .await
            .optional()?;

        populate(conn, invoice).await
    }

    async fn get_by_number(
        &self,
        owner: &UserId,
        invoice_number: &str,
    ) -> Result<Option<PopulatedInvoice>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        let invoice = invoices::table
            .filter(invoices::owner_id.eq(owner.as_str()))
            .filter(invoices::invoice_number.eq(invoice_number))
            .order(invoices::created_at.asc())
            .select(Invoice::as_select())
            .first(conn)
            .await
            .optional()?;

        populate(conn, invoice).await
    }

    async fn get_line_item(&self, owner: &UserId, id: Uuid) -> Result<Option<LineItem>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;

        Ok(line_items::table
            .filter(line_items::id.eq(id))
            .filter(line_items::owner_id.eq(owner.as_str()))
            .select(LineItem::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn add_line_item(
        &self,
        owner: &UserId,
        invoice_id: Uuid,
        draft: LineItemDraft,
    ) -> Result<Option<LineItem>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let Some(invoice) = lock_invoice(conn, owner, invoice_id).await? else {
                    return Ok(None);
                };

                let last = line_items::table
                    .filter(line_items::invoice_id.eq(invoice_id))
                    .select(diesel::dsl::max(line_items::position))
                    .first::<Option<i32>>(conn)
                    .await?;
                let item = LineItem::new(owner, invoice_id, last.map_or(0, |p| p + 1), draft);
                item.check()?;
                diesel::insert_into(line_items::table)
                    .values(&item)
                    .execute(conn)
                    .await?;

                refresh_totals(conn, invoice).await?;
                Ok(Some(item))
            }
            .scope_boxed()
        })
        .await
    }

    async fn update_line_item(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: LineItemPatch,
    ) -> Result<Option<LineItem>, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let invoice_id = line_items::table
                    .filter(line_items::id.eq(id))
                    .filter(line_items::owner_id.eq(owner.as_str()))
                    .select(line_items::invoice_id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                let Some(invoice_id) = invoice_id else {
                    return Ok(None);
                };
                // parent first so line item writers queue up in the same order
                let Some(invoice) = lock_invoice(conn, owner, invoice_id).await? else {
                    return Ok(None);
                };

                let mut item = line_items::table
                    .find(id)
                    .select(LineItem::as_select())
                    .first(conn)
                    .await?;
                item.apply(patch);
                item.check()?;
                diesel::update(line_items::table.find(id))
                    .set(&item)
                    .execute(conn)
                    .await?;

                refresh_totals(conn, invoice).await?;
                Ok(Some(item))
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_line_item(&self, owner: &UserId, id: Uuid) -> Result<bool, Error> {
        let mut conn = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let invoice_id = line_items::table
                    .filter(line_items::id.eq(id))
                    .filter(line_items::owner_id.eq(owner.as_str()))
                    .select(line_items::invoice_id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                let Some(invoice_id) = invoice_id else {
                    return Ok(false);
                };
                let Some(invoice) = lock_invoice(conn, owner, invoice_id).await? else {
                    return Ok(false);
                };

                let deleted = diesel::delete(line_items::table.find(id))
                    .execute(conn)
                    .await?;
                refresh_totals(conn, invoice).await?;

                Ok(deleted > 0)
            }
            .scope_boxed()
        })
        .await
    }
}
