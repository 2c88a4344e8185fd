use super::invoices::parse_id;
use crate::access::{self, PASSWORD_HEADER};
use crate::database::Store;
use crate::error::Error;
use crate::models::PopulatedInvoice;
use axum::{
    extract::Path,
    http::{HeaderMap, HeaderName},
    Json,
};

static PASSWORD: HeaderName = HeaderName::from_static(PASSWORD_HEADER);

/// Read path of the shareable URL, no partition and no identity involved
pub async fn get(
    store: Store,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PopulatedInvoice>, Error> {
    let id = parse_id(&id, "Invoice")?;
    let invoice = store
        .get_public(id)
        .await?
        .ok_or(Error::NotFound("Invoice"))?;

    let supplied = headers.get(&PASSWORD).map(|value| value.as_bytes());

    access::unlock(invoice, supplied).map(Json)
}
