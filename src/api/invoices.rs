use super::line_items::LineItemDraft;
use super::validation::{check_amount, check_range, nullable, Constraints, Validated};
use crate::database::Store;
use crate::error::{Error, FieldError};
use crate::hosting::{self, Hosting};
use crate::identity::UserId;
use crate::mailgun::{OutgoingMail, Outbox};
use crate::models::{DocumentType, InvoiceStatus, PopulatedInvoice};
use crate::money::{Totals, MAX_AMOUNT};
use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use garde::Validate;
use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

fn default_currency() -> String {
    String::from("USD")
}

fn default_template() -> String {
    String::from("classic")
}

fn default_primary_color() -> String {
    String::from("#2563eb")
}

fn default_secondary_color() -> String {
    String::from("#64748b")
}

fn default_font_family() -> String {
    String::from("Inter")
}

/// Invoice fields of a create request. Required text defaults to "" so that a
/// missing field is reported by name instead of as a JSON error
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    #[serde(default)]
    #[garde(length(min = 1, max = 64))]
    pub invoice_number: String,
    #[serde(default)]
    #[garde(skip)]
    pub status: InvoiceStatus,

    #[serde(default)]
    #[garde(length(min = 1, max = 256))]
    pub company_name: String,
    #[serde(default)]
    #[garde(email)]
    pub company_email: String,
    #[serde(default)]
    #[garde(length(max = 64))]
    pub company_phone: Option<String>,
    #[serde(default)]
    #[garde(length(max = 256))]
    pub company_website: Option<String>,
    #[serde(default)]
    #[garde(length(max = 1024))]
    pub company_address: Option<String>,
    #[serde(default)]
    #[garde(length(max = 3_000_000))]
    pub company_logo: Option<String>,

    #[serde(default)]
    #[garde(length(min = 1, max = 256))]
    pub client_name: String,
    #[serde(default)]
    #[garde(email)]
    pub client_email: String,
    #[serde(default)]
    #[garde(length(max = 256))]
    pub client_company: Option<String>,
    #[serde(default)]
    #[garde(length(max = 64))]
    pub client_phone: Option<String>,
    #[serde(default)]
    #[garde(length(max = 1024))]
    pub client_address: Option<String>,

    #[serde(default)]
    #[garde(length(min = 1, max = 32))]
    pub invoice_date: String,
    #[serde(default)]
    #[garde(length(max = 32))]
    pub due_date: Option<String>,
    #[serde(default)]
    #[garde(length(max = 4096))]
    pub notes: Option<String>,
    #[serde(default)]
    #[garde(length(max = 4096))]
    pub text_information: Option<String>,
    #[serde(default)]
    #[garde(length(max = 128))]
    pub shipping_code: Option<String>,

    #[serde(default = "default_currency")]
    #[garde(pattern(r"^[A-Z]{3}$"))]
    pub currency: String,
    #[serde(default)]
    #[garde(skip)]
    pub tax_percentage: Decimal,
    #[serde(default)]
    #[garde(skip)]
    pub shipping_cost: Decimal,

    #[serde(default = "default_template")]
    #[garde(length(min = 1, max = 64))]
    pub template: String,
    #[serde(default)]
    #[garde(skip)]
    pub document_type: DocumentType,
    #[serde(default = "default_primary_color")]
    #[garde(pattern(r"^#[0-9a-fA-F]{6}$"))]
    pub primary_color: String,
    #[serde(default = "default_secondary_color")]
    #[garde(pattern(r"^#[0-9a-fA-F]{6}$"))]
    pub secondary_color: String,
    #[serde(default = "default_font_family")]
    #[garde(length(min = 1, max = 64))]
    pub font_family: String,

    #[serde(default)]
    #[garde(skip)]
    pub is_hosted: bool,
    #[serde(default)]
    #[garde(skip)]
    pub is_password_protected: bool,
    #[serde(default)]
    #[garde(length(max = 128))]
    pub password: Option<String>,
}

impl InvoiceDraft {
    fn constraints_at(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_range(
            errors,
            format!("{prefix}taxPercentage"),
            self.tax_percentage,
            Decimal::ONE_HUNDRED,
        );
        check_amount(errors, format!("{prefix}shippingCost"), self.shipping_cost);

        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if self.is_password_protected && !has_password {
            errors.push(FieldError::new(
                format!("{prefix}password"),
                "required when the invoice is password protected",
            ));
        }
    }
}

/// Body for the request for creating new invoices
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoice {
    #[garde(dive)]
    pub invoice: InvoiceDraft,
    /// The rows of the invoice, at least one
    #[serde(default)]
    #[garde(length(min = 1), dive)]
    pub line_items: Vec<LineItemDraft>,
}

impl Constraints for CreateInvoice {
    fn constraints(&self, errors: &mut Vec<FieldError>) {
        self.invoice.constraints_at("invoice.", errors);
        for (index, item) in self.line_items.iter().enumerate() {
            item.constraints_at(&format!("lineItems[{index}]."), errors);
        }

        let invoice = &self.invoice;
        let amounts = self
            .line_items
            .iter()
            .map(LineItemDraft::amount)
            .collect::<Option<Vec<_>>>();
        let within = |value: Decimal, max: Decimal| !value.is_sign_negative() && value <= max;
        let charges_fit = within(invoice.tax_percentage, Decimal::ONE_HUNDRED)
            && within(invoice.shipping_cost, MAX_AMOUNT);
        if let (Some(amounts), true) = (amounts, charges_fit) {
            let totals = Totals::compute(amounts, invoice.tax_percentage, invoice.shipping_cost);
            check_amount(errors, "subtotal", totals.subtotal);
            check_amount(errors, "tax", totals.tax);
            check_amount(errors, "total", totals.total);
        }
    }
}

/// Partial update. A missing field keeps its value, `null` clears a nullable
/// field. Derived amounts are not accepted here.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePatch {
    #[garde(length(min = 1, max = 64))]
    pub invoice_number: Option<String>,
    #[garde(skip)]
    pub status: Option<InvoiceStatus>,

    #[garde(length(min = 1, max = 256))]
    pub company_name: Option<String>,
    #[garde(email)]
    pub company_email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 64))]
    pub company_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 256))]
    pub company_website: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 1024))]
    pub company_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 3_000_000))]
    pub company_logo: Option<Option<String>>,

    #[garde(length(min = 1, max = 256))]
    pub client_name: Option<String>,
    #[garde(email)]
    pub client_email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 256))]
    pub client_company: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 64))]
    pub client_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 1024))]
    pub client_address: Option<Option<String>>,

    #[garde(length(min = 1, max = 32))]
    pub invoice_date: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 32))]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 4096))]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 4096))]
    pub text_information: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 128))]
    pub shipping_code: Option<Option<String>>,

    #[garde(pattern(r"^[A-Z]{3}$"))]
    pub currency: Option<String>,
    #[garde(skip)]
    pub tax_percentage: Option<Decimal>,
    #[garde(skip)]
    pub shipping_cost: Option<Decimal>,

    #[garde(length(min = 1, max = 64))]
    pub template: Option<String>,
    #[garde(skip)]
    pub document_type: Option<DocumentType>,
    #[garde(pattern(r"^#[0-9a-fA-F]{6}$"))]
    pub primary_color: Option<String>,
    #[garde(pattern(r"^#[0-9a-fA-F]{6}$"))]
    pub secondary_color: Option<String>,
    #[garde(length(min = 1, max = 64))]
    pub font_family: Option<String>,

    #[garde(skip)]
    pub is_hosted: Option<bool>,
    #[garde(skip)]
    pub is_password_protected: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    #[garde(length(max = 128))]
    pub password: Option<Option<String>>,

    /// Set by the server only
    #[serde(skip)]
    #[garde(skip)]
    pub hosted_url: Option<String>,
}

impl InvoicePatch {
    /// Turns hosting on and stores the minted URL
    pub fn hosting(url: String) -> Self {
        Self {
            is_hosted: Some(true),
            hosted_url: Some(url),
            ..Default::default()
        }
    }

    pub fn status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

impl Constraints for InvoicePatch {
    fn constraints(&self, errors: &mut Vec<FieldError>) {
        if let Some(tax_percentage) = self.tax_percentage {
            check_range(errors, "taxPercentage", tax_percentage, Decimal::ONE_HUNDRED);
        }
        if let Some(shipping_cost) = self.shipping_cost {
            check_amount(errors, "shippingCost", shipping_cost);
        }
        if self.is_password_protected == Some(true) && matches!(self.password, Some(None)) {
            errors.push(FieldError::new(
                "password",
                "cannot be cleared while enabling password protection",
            ));
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendEmail {
    #[garde(email)]
    pub to: String,
    #[garde(length(min = 1, max = 256))]
    pub subject: String,
    #[serde(default)]
    #[garde(length(max = 10_000))]
    pub message: Option<String>,
    #[serde(default = "attach_pdf_default", alias = "attachPDF")]
    #[garde(skip)]
    pub attach_pdf: bool,
}

fn attach_pdf_default() -> bool {
    true
}

impl Constraints for SendEmail {}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedUrl {
    pub hosted_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Ids that are not UUIDs cannot exist
pub fn parse_id(raw: &str, kind: &'static str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::NotFound(kind))
}

pub async fn list(store: Store, user: UserId) -> Result<Json<Vec<PopulatedInvoice>>, Error> {
    let invoices = store.list(&user).await?;
    debug!(%user, count = invoices.len(), "listed invoices");
    Ok(Json(invoices))
}

pub async fn get(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
) -> Result<Json<PopulatedInvoice>, Error> {
    let id = parse_id(&id, "Invoice")?;
    store
        .get(&user, id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Invoice"))
}

pub async fn by_number(
    store: Store,
    user: UserId,
    Path(number): Path<String>,
) -> Result<Json<PopulatedInvoice>, Error> {
    store
        .get_by_number(&user, &number)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Invoice"))
}

pub async fn create(
    store: Store,
    user: UserId,
    Validated(body): Validated<CreateInvoice>,
) -> Result<(StatusCode, Json<PopulatedInvoice>), Error> {
    let created = store.create(&user, body).await?;
    info!(%user, id = %created.invoice.id, total = %created.invoice.total, "created invoice");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
    Validated(patch): Validated<InvoicePatch>,
) -> Result<Json<PopulatedInvoice>, Error> {
    let id = parse_id(&id, "Invoice")?;
    store
        .update(&user, id, patch)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Invoice"))
}

pub async fn delete(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    let id = parse_id(&id, "Invoice")?;
    if store.delete(&user, id).await? {
        info!(%user, %id, "deleted invoice");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Invoice"))
    }
}

pub async fn hosted_url(
    store: Store,
    hosting: Hosting,
    user: UserId,
    Path(id): Path<String>,
) -> Result<Json<HostedUrl>, Error> {
    let id = parse_id(&id, "Invoice")?;
    let hosted_url = hosting.publish(&store, &user, id).await?;
    Ok(Json(HostedUrl { hosted_url }))
}

pub async fn qr(
    store: Store,
    hosting: Hosting,
    user: UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let id = parse_id(&id, "Invoice")?;
    let hosted_url = hosting.publish(&store, &user, id).await?;
    let svg = hosting::qr_svg(&hosted_url)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

pub async fn send_email(
    store: Store,
    outbox: Outbox,
    hosting: Hosting,
    user: UserId,
    Path(id): Path<String>,
    Validated(request): Validated<SendEmail>,
) -> Result<Json<Message>, Error> {
    let id = parse_id(&id, "Invoice")?;
    let invoice = store
        .get(&user, id)
        .await?
        .ok_or(Error::NotFound("Invoice"))?;

    let view_url = invoice
        .invoice
        .hosted_url
        .clone()
        .unwrap_or_else(|| hosting.url_for(id));
    if request.attach_pdf {
        // PDF documents are rendered by the client, the mail links the hosted view
        debug!(%id, "pdf attachment requested, linking hosted view instead");
    }

    outbox
        .send(OutgoingMail::for_invoice(&invoice, &request, &view_url)?)
        .await?;
    info!(%user, %id, "sent invoice email");

    let mut patch = InvoicePatch::status(InvoiceStatus::Sent);
    if invoice.invoice.is_hosted && invoice.invoice.hosted_url.is_none() {
        patch.hosted_url = Some(view_url);
    }
    store
        .update(&user, id, patch)
        .await?
        .ok_or(Error::NotFound("Invoice"))?;

    Ok(Json(Message {
        message: String::from("Email sent successfully"),
    }))
}

#[cfg(test)]
mod tests {
    use super::SendEmail;
    use serde_json::json;

    fn send_email(flag: &str, value: bool) -> SendEmail {
        let mut body = json!({ "to": "ap@globex.test", "subject": "Invoice" });
        body[flag] = json!(value);
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn attach_pdf_accepts_both_spellings() {
        assert!(!send_email("attachPdf", false).attach_pdf);
        assert!(!send_email("attachPDF", false).attach_pdf);
        assert!(send_email("other", false).attach_pdf);
    }
}
