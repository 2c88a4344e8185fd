use crate::api::invoices::{CreateInvoice, InvoiceDraft, InvoicePatch};
use crate::api::line_items::{LineItemDraft, LineItemPatch};
use crate::api::validation::check_amount;
use crate::error::{Error, FieldError};
use crate::identity::UserId;
use crate::money::{self, Totals};
use crate::schema::{invoices, line_items};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(
    diesel_derive_enum::DbEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[ExistingTypePath = "crate::schema::sql_types::InvoiceStatus"]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

#[derive(
    diesel_derive_enum::DbEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[ExistingTypePath = "crate::schema::sql_types::DocumentType"]
#[DbValueStyle = "kebab-case"]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    #[default]
    Invoice,
    CreditNote,
    Quote,
    PurchaseOrder,
}

/// The invoice model as stored, `subtotal`, `tax` and `total` are always
/// derived from the line items and never taken from a request
#[derive(
    Queryable,
    Selectable,
    Insertable,
    AsChangeset,
    Identifiable,
    Clone,
    Debug,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = invoices, treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    #[serde(skip)]
    pub owner_id: String,
    pub invoice_number: String,
    pub status: InvoiceStatus,

    pub company_name: String,
    pub company_email: String,
    pub company_phone: Option<String>,
    pub company_website: Option<String>,
    pub company_address: Option<String>,
    /// Data URI as returned by the logo upload
    pub company_logo: Option<String>,

    pub client_name: String,
    pub client_email: String,
    pub client_company: Option<String>,
    pub client_phone: Option<String>,
    pub client_address: Option<String>,

    pub invoice_date: String,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub text_information: Option<String>,
    pub shipping_code: Option<String>,

    pub currency: String,
    pub subtotal: Decimal,
    pub tax_percentage: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,

    pub template: String,
    pub document_type: DocumentType,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,

    pub is_hosted: bool,
    pub is_password_protected: bool,
    /// Compared as is, never serialized
    #[serde(skip)]
    pub password: Option<String>,
    /// Minted by the server, only set while `is_hosted`
    pub hosted_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single billable row, `amount` is always `rate × quantity`
#[derive(
    Queryable,
    Selectable,
    Insertable,
    AsChangeset,
    Identifiable,
    Clone,
    Debug,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = line_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    #[serde(skip)]
    pub owner_id: String,
    #[serde(skip)]
    pub position: i32,
    pub description: String,
    pub quantity: i32,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// An invoice together with its ordered line items
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<LineItem>,
}

/// Empty optional text is stored as absent
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn merge<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

impl Invoice {
    fn new(id: Uuid, owner: &UserId, draft: InvoiceDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: owner.to_string(),
            invoice_number: draft.invoice_number,
            status: draft.status,
            company_name: draft.company_name,
            company_email: draft.company_email,
            company_phone: present(draft.company_phone),
            company_website: present(draft.company_website),
            company_address: present(draft.company_address),
            company_logo: present(draft.company_logo),
            client_name: draft.client_name,
            client_email: draft.client_email,
            client_company: present(draft.client_company),
            client_phone: present(draft.client_phone),
            client_address: present(draft.client_address),
            invoice_date: draft.invoice_date,
            due_date: present(draft.due_date),
            notes: present(draft.notes),
            text_information: present(draft.text_information),
            shipping_code: present(draft.shipping_code),
            currency: draft.currency,
            subtotal: Decimal::ZERO,
            tax_percentage: money::round(draft.tax_percentage),
            tax: Decimal::ZERO,
            shipping_cost: money::round(draft.shipping_cost),
            total: Decimal::ZERO,
            template: draft.template,
            document_type: draft.document_type,
            primary_color: draft.primary_color,
            secondary_color: draft.secondary_color,
            font_family: draft.font_family,
            is_hosted: draft.is_hosted,
            is_password_protected: draft.is_password_protected,
            password: present(draft.password),
            hosted_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets `subtotal`, `tax` and `total` from the given line items
    pub fn recompute(&mut self, items: &[LineItem]) {
        let totals = Totals::compute(
            items.iter().map(|item| item.amount),
            self.tax_percentage,
            self.shipping_cost,
        );
        self.subtotal = totals.subtotal;
        self.tax = totals.tax;
        self.total = totals.total;
    }

    /// Rules of the stored record that no single request field can guarantee,
    /// checked after every merge and recompute
    pub fn check(&self) -> Result<(), Error> {
        let mut errors = Vec::new();
        check_amount(&mut errors, "subtotal", self.subtotal);
        check_amount(&mut errors, "tax", self.tax);
        check_amount(&mut errors, "total", self.total);
        if self.is_password_protected && self.password.as_deref().map_or(true, str::is_empty) {
            errors.push(FieldError::new(
                "password",
                "required when the invoice is password protected",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Shallow merge: fields missing from the patch keep their value.
    /// Callers recompute the totals afterwards.
    pub fn apply(&mut self, patch: InvoicePatch, now: DateTime<Utc>) {
        merge(&mut self.invoice_number, patch.invoice_number);
        merge(&mut self.status, patch.status);
        merge(&mut self.company_name, patch.company_name);
        merge(&mut self.company_email, patch.company_email);
        merge(&mut self.company_phone, patch.company_phone);
        merge(&mut self.company_website, patch.company_website);
        merge(&mut self.company_address, patch.company_address);
        merge(&mut self.company_logo, patch.company_logo);
        merge(&mut self.client_name, patch.client_name);
        merge(&mut self.client_email, patch.client_email);
        merge(&mut self.client_company, patch.client_company);
        merge(&mut self.client_phone, patch.client_phone);
        merge(&mut self.client_address, patch.client_address);
        merge(&mut self.invoice_date, patch.invoice_date);
        merge(&mut self.due_date, patch.due_date);
        merge(&mut self.notes, patch.notes);
        merge(&mut self.text_information, patch.text_information);
        merge(&mut self.shipping_code, patch.shipping_code);
        merge(&mut self.currency, patch.currency);
        merge(
            &mut self.tax_percentage,
            patch.tax_percentage.map(money::round),
        );
        merge(&mut self.shipping_cost, patch.shipping_cost.map(money::round));
        merge(&mut self.template, patch.template);
        merge(&mut self.document_type, patch.document_type);
        merge(&mut self.primary_color, patch.primary_color);
        merge(&mut self.secondary_color, patch.secondary_color);
        merge(&mut self.font_family, patch.font_family);
        merge(&mut self.is_hosted, patch.is_hosted);
        merge(&mut self.is_password_protected, patch.is_password_protected);
        merge(&mut self.password, patch.password);
        if patch.hosted_url.is_some() {
            self.hosted_url = patch.hosted_url;
        }
        if !self.is_hosted {
            self.hosted_url = None;
        }
        self.updated_at = now;
    }
}

impl LineItem {
    pub fn new(owner: &UserId, invoice_id: Uuid, position: i32, draft: LineItemDraft) -> Self {
        let rate = money::round(draft.rate);
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            owner_id: owner.to_string(),
            position,
            description: draft.description,
            quantity: draft.quantity,
            rate,
            amount: money::line_amount(rate, draft.quantity),
        }
    }

    pub fn apply(&mut self, patch: LineItemPatch) {
        merge(&mut self.description, patch.description);
        merge(&mut self.quantity, patch.quantity);
        merge(&mut self.rate, patch.rate.map(money::round));
        self.amount = money::line_amount(self.rate, self.quantity);
    }

    pub fn check(&self) -> Result<(), Error> {
        let mut errors = Vec::new();
        check_amount(&mut errors, "amount", self.amount);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

impl PopulatedInvoice {
    /// Assigns ids and computes every derived field of a new invoice
    pub fn build(owner: &UserId, request: CreateInvoice, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let line_items = request
            .line_items
            .into_iter()
            .zip(0..)
            .map(|(draft, position)| LineItem::new(owner, id, position, draft))
            .collect::<Vec<_>>();

        let mut invoice = Invoice::new(id, owner, request.invoice, now);
        invoice.recompute(&line_items);

        Self {
            invoice,
            line_items,
        }
    }

    /// Attaches line items to their invoices, keeping the invoice order
    pub fn group(invoices: Vec<Invoice>, items: Vec<LineItem>) -> Vec<Self> {
        let mut by_invoice: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for item in items {
            by_invoice.entry(item.invoice_id).or_default().push(item);
        }

        invoices
            .into_iter()
            .map(|invoice| {
                let mut line_items = by_invoice.remove(&invoice.id).unwrap_or_default();
                line_items.sort_by_key(|item| item.position);
                Self {
                    invoice,
                    line_items,
                }
            })
            .collect()
    }
}
