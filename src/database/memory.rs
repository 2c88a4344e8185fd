//! Process-lifetime storage, one partition per caller.
//!
//! All partitions sit behind a single lock and every operation finishes
//! while holding it, so derived amounts can never be observed half updated.
//! Hosted invoices are indexed by id for the public read.

use super::InvoiceStore;
use crate::api::invoices::{CreateInvoice, InvoicePatch};
use crate::api::line_items::{LineItemDraft, LineItemPatch};
use crate::error::Error;
use crate::identity::UserId;
use crate::models::{Invoice, LineItem, PopulatedInvoice};
use axum::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Partition {
    invoices: HashMap<Uuid, Invoice>,
    line_items: HashMap<Uuid, LineItem>,
}

impl Partition {
    fn items_of(&self, invoice_id: Uuid) -> Vec<LineItem> {
        let mut items = self
            .line_items
            .values()
            .filter(|item| item.invoice_id == invoice_id)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by_key(|item| item.position);
        items
    }

    fn populated(&self, invoice: &Invoice) -> PopulatedInvoice {
        PopulatedInvoice {
            invoice: invoice.clone(),
            line_items: self.items_of(invoice.id),
        }
    }

    /// The invoice as it would be with `items`, rejected when the totals no
    /// longer fit. Nothing is written.
    fn preview(&self, invoice_id: Uuid, items: &[LineItem]) -> Result<Option<Invoice>, Error> {
        let Some(invoice) = self.invoices.get(&invoice_id) else {
            return Ok(None);
        };
        let mut invoice = invoice.clone();
        invoice.recompute(items);
        invoice.updated_at = Utc::now();
        invoice.check()?;
        Ok(Some(invoice))
    }
}

#[derive(Default)]
struct Partitions {
    users: HashMap<UserId, Partition>,
    /// Hosted invoice id -> owner
    hosted: HashMap<Uuid, UserId>,
}

impl Partitions {
    fn reindex(&mut self, owner: &UserId, invoice: &Invoice) {
        if invoice.is_hosted {
            self.hosted.insert(invoice.id, owner.clone());
        } else {
            self.hosted.remove(&invoice.id);
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Partitions>,
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create(
        &self,
        owner: &UserId,
        request: CreateInvoice,
    ) -> Result<PopulatedInvoice, Error> {
        let created = PopulatedInvoice::build(owner, request, Utc::now());

        let mut inner = self.inner.write().await;
        inner.reindex(owner, &created.invoice);
        let partition = inner.users.entry(owner.clone()).or_default();
        partition
            .invoices
            .insert(created.invoice.id, created.invoice.clone());
        for item in &created.line_items {
            partition.line_items.insert(item.id, item.clone());
        }

        Ok(created)
    }

    async fn get(&self, owner: &UserId, id: Uuid) -> Result<Option<PopulatedInvoice>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(owner).and_then(|partition| {
            partition
                .invoices
                .get(&id)
                .map(|invoice| partition.populated(invoice))
        }))
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<PopulatedInvoice>, Error> {
        let mut inner = self.inner.write().await;
        let partition = inner.users.entry(owner.clone()).or_default();

        let mut invoices = partition
            .invoices
            .values()
            .map(|invoice| partition.populated(invoice))
            .collect::<Vec<_>>();
        invoices.sort_by(|a, b| b.invoice.created_at.cmp(&a.invoice.created_at));

        Ok(invoices)
    }

    async fn update(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: InvoicePatch,
    ) -> Result<Option<PopulatedInvoice>, Error> {
        let mut inner = self.inner.write().await;
        let Some(partition) = inner.users.get_mut(owner) else {
            return Ok(None);
        };
        let items = partition.items_of(id);
        let Some(invoice) = partition.invoices.get_mut(&id) else {
            return Ok(None);
        };

        let mut merged = invoice.clone();
        merged.apply(patch, Utc::now());
        merged.recompute(&items);
        merged.check()?;
        *invoice = merged.clone();

        let updated = PopulatedInvoice {
            invoice: merged,
            line_items: items,
        };
        inner.reindex(owner, &updated.invoice);

        Ok(Some(updated))
    }

    async fn delete(&self, owner: &UserId, id: Uuid) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let Some(partition) = inner.users.get_mut(owner) else {
            return Ok(false);
        };

        partition.line_items.retain(|_, item| item.invoice_id != id);
        let existed = partition.invoices.remove(&id).is_some();
        if existed {
            inner.hosted.remove(&id);
        }

        Ok(existed)
    }

    async fn get_public(&self, id: Uuid) -> Result<Option<PopulatedInvoice>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .hosted
            .get(&id)
            .and_then(|owner| inner.users.get(owner))
            .and_then(|partition| {
                partition
                    .invoices
                    .get(&id)
                    .filter(|invoice| invoice.is_hosted)
                    .map(|invoice| partition.populated(invoice))
            }))
    }

    async fn get_by_number(
        &self,
        owner: &UserId,
        invoice_number: &str,
    ) -> Result<Option<PopulatedInvoice>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(owner).and_then(|partition| {
            partition
                .invoices
                .values()
                .filter(|invoice| invoice.invoice_number == invoice_number)
                .min_by_key(|invoice| invoice.created_at)
                .map(|invoice| partition.populated(invoice))
        }))
    }

    async fn get_line_item(&self, owner: &UserId, id: Uuid) -> Result<Option<LineItem>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .get(owner)
            .and_then(|partition| partition.line_items.get(&id))
            .cloned())
    }

    async fn add_line_item(
        &self,
        owner: &UserId,
        invoice_id: Uuid,
        draft: LineItemDraft,
    ) -> Result<Option<LineItem>, Error> {
        let mut inner = self.inner.write().await;
        let Some(partition) = inner.users.get_mut(owner) else {
            return Ok(None);
        };
        if !partition.invoices.contains_key(&invoice_id) {
            return Ok(None);
        }

        let mut items = partition.items_of(invoice_id);
        let position = items.last().map_or(0, |item| item.position + 1);
        let item = LineItem::new(owner, invoice_id, position, draft);
        item.check()?;
        items.push(item.clone());

        let Some(invoice) = partition.preview(invoice_id, &items)? else {
            return Ok(None);
        };
        partition.invoices.insert(invoice_id, invoice);
        partition.line_items.insert(item.id, item.clone());

        Ok(Some(item))
    }

    async fn update_line_item(
        &self,
        owner: &UserId,
        id: Uuid,
        patch: LineItemPatch,
    ) -> Result<Option<LineItem>, Error> {
        let mut inner = self.inner.write().await;
        let Some(partition) = inner.users.get_mut(owner) else {
            return Ok(None);
        };
        let Some(item) = partition.line_items.get(&id) else {
            return Ok(None);
        };

        let mut item = item.clone();
        item.apply(patch);
        item.check()?;
        let items = partition
            .items_of(item.invoice_id)
            .into_iter()
            .map(|other| if other.id == id { item.clone() } else { other })
            .collect::<Vec<_>>();

        let Some(invoice) = partition.preview(item.invoice_id, &items)? else {
            return Ok(None);
        };
        partition.invoices.insert(invoice.id, invoice);
        partition.line_items.insert(id, item.clone());

        Ok(Some(item))
    }

    async fn delete_line_item(&self, owner: &UserId, id: Uuid) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let Some(partition) = inner.users.get_mut(owner) else {
            return Ok(false);
        };
        let Some(invoice_id) = partition.line_items.get(&id).map(|item| item.invoice_id) else {
            return Ok(false);
        };

        let items = partition
            .items_of(invoice_id)
            .into_iter()
            .filter(|item| item.id != id)
            .collect::<Vec<_>>();
        if let Some(invoice) = partition.preview(invoice_id, &items)? {
            partition.invoices.insert(invoice_id, invoice);
        }
        partition.line_items.remove(&id);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(agent: &str) -> UserId {
        UserId::resolve(Some("192.0.2.1"), Some(agent), Some("en-US"))
    }

    fn request(hosted: bool) -> CreateInvoice {
        serde_json::from_value(json!({
            "invoice": {
                "invoiceNumber": "INV-001",
                "companyName": "Acme Design",
                "companyEmail": "billing@acme.test",
                "clientName": "Globex",
                "clientEmail": "ap@globex.test",
                "invoiceDate": "2024-09-01",
                "taxPercentage": "10",
                "shippingCost": "5.00",
                "isHosted": hosted,
            },
            "lineItems": [
                { "description": "Design", "quantity": 2, "rate": "50.00" },
                { "description": "Hosting", "quantity": 1, "rate": "25.00" },
            ],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_computes_derived_fields() {
        let store = MemoryStore::default();
        let created = store.create(&user("a"), request(false)).await.unwrap();

        let invoice = &created.invoice;
        assert_eq!(invoice.subtotal.to_string(), "125.00");
        assert_eq!(invoice.tax.to_string(), "12.50");
        assert_eq!(invoice.total.to_string(), "142.50");
        assert!(invoice.hosted_url.is_none());

        let amounts = created
            .line_items
            .iter()
            .map(|item| item.amount.to_string())
            .collect::<Vec<_>>();
        assert_eq!(amounts, ["100.00", "25.00"]);
        assert!(created.line_items.iter().all(|i| i.invoice_id == invoice.id));
    }

    #[tokio::test]
    async fn unknown_user_has_empty_partition() {
        let store = MemoryStore::default();
        assert!(store.list(&user("new")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let store = MemoryStore::default();
        let (a, b) = (user("a"), user("b"));
        let created = store.create(&a, request(false)).await.unwrap();
        let id = created.invoice.id;
        let item_id = created.line_items[0].id;

        assert!(store.get(&b, id).await.unwrap().is_none());
        assert!(store.list(&b).await.unwrap().is_empty());
        assert!(store.get_line_item(&b, item_id).await.unwrap().is_none());
        assert!(store
            .update(&b, id, InvoicePatch::status(crate::models::InvoiceStatus::Paid))
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete(&b, id).await.unwrap());

        assert!(store.get(&a, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn public_read_requires_hosting() {
        let store = MemoryStore::default();
        let owner = user("a");
        let id = store.create(&owner, request(false)).await.unwrap().invoice.id;

        assert!(store.get_public(id).await.unwrap().is_none());

        let patch = InvoicePatch {
            is_hosted: Some(true),
            ..Default::default()
        };
        store.update(&owner, id, patch).await.unwrap().unwrap();
        let public = store.get_public(id).await.unwrap().unwrap();
        assert_eq!(public.line_items.len(), 2);

        let patch = InvoicePatch {
            is_hosted: Some(false),
            ..Default::default()
        };
        store.update(&owner, id, patch).await.unwrap().unwrap();
        assert!(store.get_public(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unhosting_clears_hosted_url() {
        let store = MemoryStore::default();
        let owner = user("a");
        let id = store.create(&owner, request(false)).await.unwrap().invoice.id;

        let hosted = store
            .update(&owner, id, InvoicePatch::hosting(String::from("http://h/view/1")))
            .await
            .unwrap()
            .unwrap();
        assert!(hosted.invoice.is_hosted);
        assert_eq!(hosted.invoice.hosted_url.as_deref(), Some("http://h/view/1"));

        let patch = InvoicePatch {
            is_hosted: Some(false),
            ..Default::default()
        };
        let unhosted = store.update(&owner, id, patch).await.unwrap().unwrap();
        assert!(unhosted.invoice.hosted_url.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_line_items() {
        let store = MemoryStore::default();
        let owner = user("a");
        let created = store.create(&owner, request(true)).await.unwrap();
        let id = created.invoice.id;

        assert!(store.delete(&owner, id).await.unwrap());
        assert!(!store.delete(&owner, id).await.unwrap());
        for item in &created.line_items {
            assert!(store.get_line_item(&owner, item.id).await.unwrap().is_none());
        }
        assert!(store.get_public(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn line_item_changes_recompute_totals() {
        let store = MemoryStore::default();
        let owner = user("a");
        let created = store.create(&owner, request(false)).await.unwrap();
        let id = created.invoice.id;

        let patch = LineItemPatch {
            quantity: Some(3),
            ..Default::default()
        };
        let item = store
            .update_line_item(&owner, created.line_items[0].id, patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.amount.to_string(), "150.00");

        let invoice = store.get(&owner, id).await.unwrap().unwrap().invoice;
        assert_eq!(invoice.subtotal.to_string(), "175.00");
        assert_eq!(invoice.tax.to_string(), "17.50");
        assert_eq!(invoice.total.to_string(), "197.50");

        assert!(store
            .delete_line_item(&owner, created.line_items[1].id)
            .await
            .unwrap());
        let invoice = store.get(&owner, id).await.unwrap().unwrap();
        assert_eq!(invoice.line_items.len(), 1);
        assert_eq!(invoice.invoice.subtotal.to_string(), "150.00");
        assert_eq!(invoice.invoice.total.to_string(), "170.00");
    }

    #[tokio::test]
    async fn added_line_items_go_last() {
        let store = MemoryStore::default();
        let owner = user("a");
        let id = store.create(&owner, request(false)).await.unwrap().invoice.id;

        let draft: LineItemDraft =
            serde_json::from_value(json!({ "description": "Support", "rate": "9.99" })).unwrap();
        let item = store
            .add_line_item(&owner, id, draft.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.amount.to_string(), "9.99");

        let invoice = store.get(&owner, id).await.unwrap().unwrap();
        assert_eq!(invoice.line_items.last().unwrap().id, item.id);
        assert_eq!(invoice.invoice.subtotal.to_string(), "134.99");

        assert!(store
            .add_line_item(&user("b"), id, draft)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_keeps_omitted_fields() {
        let store = MemoryStore::default();
        let owner = user("a");
        let id = store.create(&owner, request(false)).await.unwrap().invoice.id;

        let patch: InvoicePatch = serde_json::from_value(json!({
            "notes": "Thanks",
            "shippingCost": "0",
        }))
        .unwrap();
        let updated = store.update(&owner, id, patch).await.unwrap().unwrap();

        assert_eq!(updated.invoice.company_name, "Acme Design");
        assert_eq!(updated.invoice.notes.as_deref(), Some("Thanks"));
        assert_eq!(updated.invoice.total.to_string(), "137.50");
        assert!(updated.invoice.updated_at >= updated.invoice.created_at);
    }

    #[tokio::test]
    async fn oversized_changes_leave_the_record_alone() {
        let store = MemoryStore::default();
        let owner = user("a");
        let created = store.create(&owner, request(false)).await.unwrap();
        let id = created.invoice.id;

        let patch = LineItemPatch {
            quantity: Some(2_000_000_000),
            ..Default::default()
        };
        let result = store
            .update_line_item(&owner, created.line_items[0].id, patch)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let patch: InvoicePatch =
            serde_json::from_value(json!({ "shippingCost": "99999999.99" })).unwrap();
        let result = store.update(&owner, id, patch).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let patch: InvoicePatch =
            serde_json::from_value(json!({ "isPasswordProtected": true })).unwrap();
        let result = store.update(&owner, id, patch).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let stored = store.get(&owner, id).await.unwrap().unwrap();
        assert_eq!(stored.line_items[0].quantity, 2);
        assert_eq!(stored.invoice.total.to_string(), "142.50");
        assert!(!stored.invoice.is_password_protected);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryStore::default();
        let owner = user("a");
        let first = store.create(&owner, request(false)).await.unwrap().invoice.id;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(&owner, request(false)).await.unwrap().invoice.id;

        let ids = store
            .list(&owner)
            .await
            .unwrap()
            .into_iter()
            .map(|invoice| invoice.invoice.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, [second, first]);
    }
}
