use super::invoices::parse_id;
use super::validation::{check_amount, Constraints, Validated};
use crate::database::Store;
use crate::error::{Error, FieldError};
use crate::identity::UserId;
use crate::models::LineItem;
use crate::money::{self, MAX_AMOUNT};
use axum::{extract::Path, http::StatusCode, Json};
use garde::Validate;
use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};

fn default_quantity() -> i32 {
    1
}

/// A row of a create request, `amount` is derived and not accepted
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDraft {
    #[serde(default)]
    #[garde(length(min = 1, max = 1024))]
    pub description: String,
    /// The quantity of the product, must be positive
    #[serde(default = "default_quantity")]
    #[garde(range(min = 1))]
    pub quantity: i32,
    /// Unit price
    #[garde(skip)]
    pub rate: Decimal,
}

impl LineItemDraft {
    /// `rate × quantity` as it will be stored, `None` when out of bounds
    pub(super) fn amount(&self) -> Option<Decimal> {
        let amount = money::round(self.rate).checked_mul(Decimal::from(self.quantity))?;
        (amount <= MAX_AMOUNT).then(|| money::round(amount))
    }

    pub(super) fn constraints_at(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_amount(errors, format!("{prefix}rate"), self.rate);
        if let Some(amount) = self.rate.checked_mul(Decimal::from(self.quantity)) {
            check_amount(errors, format!("{prefix}amount"), amount);
        }
    }
}

impl Constraints for LineItemDraft {
    fn constraints(&self, errors: &mut Vec<FieldError>) {
        self.constraints_at("", errors);
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPatch {
    #[garde(length(min = 1, max = 1024))]
    pub description: Option<String>,
    #[garde(range(min = 1))]
    pub quantity: Option<i32>,
    #[garde(skip)]
    pub rate: Option<Decimal>,
}

impl Constraints for LineItemPatch {
    fn constraints(&self, errors: &mut Vec<FieldError>) {
        if let Some(rate) = self.rate {
            check_amount(errors, "rate", rate);
        }
    }
}

pub async fn list(
    store: Store,
    user: UserId,
    Path(invoice_id): Path<String>,
) -> Result<Json<Vec<LineItem>>, Error> {
    let invoice_id = parse_id(&invoice_id, "Invoice")?;
    let invoice = store
        .get(&user, invoice_id)
        .await?
        .ok_or(Error::NotFound("Invoice"))?;
    Ok(Json(invoice.line_items))
}

pub async fn add(
    store: Store,
    user: UserId,
    Path(invoice_id): Path<String>,
    Validated(draft): Validated<LineItemDraft>,
) -> Result<(StatusCode, Json<LineItem>), Error> {
    let invoice_id = parse_id(&invoice_id, "Invoice")?;
    let item = store
        .add_line_item(&user, invoice_id, draft)
        .await?
        .ok_or(Error::NotFound("Invoice"))?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
) -> Result<Json<LineItem>, Error> {
    let id = parse_id(&id, "Line item")?;
    store
        .get_line_item(&user, id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Line item"))
}

pub async fn update(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
    Validated(patch): Validated<LineItemPatch>,
) -> Result<Json<LineItem>, Error> {
    let id = parse_id(&id, "Line item")?;
    store
        .update_line_item(&user, id, patch)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Line item"))
}

pub async fn delete(
    store: Store,
    user: UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    let id = parse_id(&id, "Line item")?;
    if store.delete_line_item(&user, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Line item"))
    }
}
