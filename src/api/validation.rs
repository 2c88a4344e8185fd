use crate::error::{Error, FieldError};
use crate::money::MAX_AMOUNT;
use axum::async_trait;
use axum::{
    extract::{FromRequest, Request},
    Json,
};
use garde::Validate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Rules on top of the garde derive, for decimals and cross-field checks
pub trait Constraints: Validate<Context = ()> {
    fn constraints(&self, _errors: &mut Vec<FieldError>) {}
}

/// JSON body that passed both garde and [`Constraints`]
pub struct Validated<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Validated<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Constraints,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;

        let mut errors = match value.validate() {
            Ok(()) => Vec::new(),
            Err(report) => match Error::from(report) {
                Error::Validation(errors) => errors,
                other => return Err(other),
            },
        };
        value.constraints(&mut errors);

        if errors.is_empty() {
            Ok(Self(value))
        } else {
            Err(Error::Validation(errors))
        }
    }
}

/// Checks `0 <= value <= max`
pub fn check_range(
    errors: &mut Vec<FieldError>,
    path: impl Into<String>,
    value: Decimal,
    max: Decimal,
) {
    if value.is_sign_negative() && !value.is_zero() {
        errors.push(FieldError::new(path, "must not be negative"));
    } else if value > max {
        errors.push(FieldError::new(path, format!("must be at most {max}")));
    }
}

pub fn check_amount(errors: &mut Vec<FieldError>, path: impl Into<String>, value: Decimal) {
    check_range(errors, path, value, MAX_AMOUNT);
}

/// Tells an explicit `null` apart from a missing field:
/// missing is `None`, `null` is `Some(None)`
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
