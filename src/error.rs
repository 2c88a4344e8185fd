use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_typed_multipart::TypedMultipartError;
use diesel_async::pooled_connection::PoolError;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// A single rejected request field, `path` uses the wire (camelCase) names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid data")]
    Validation(Vec<FieldError>),
    #[error("Password required")]
    PasswordRequired(Uuid),
    #[error("Incorrect password")]
    WrongPassword(Uuid),
    #[error("{0}")]
    JsonRejection(#[from] axum::extract::rejection::JsonRejection),
    #[error("Error in handling multipart request")]
    MultipartRejection(#[from] TypedMultipartError),
    #[error("Missing multipart field {0}")]
    MissingField(String),
    #[error("Unsupported file format: {0}. Only image files are allowed")]
    UnsupportedFileFormat(String),
    #[error("File too large, the limit is {0} bytes")]
    FileTooLarge(usize),
    #[error("Failed to send email")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Email delivery is not configured")]
    MailNotConfigured,
    #[error("Failed to render email")]
    TemplateError(#[from] askama::Error),
    #[error("Failed to render QR code")]
    QrError(#[from] qrcode::types::QrError),
    #[error("Database error")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Database pool error")]
    PoolError(#[from] PoolError),
    #[error("Database pool error")]
    PoolRunError(#[from] bb8::RunError<PoolError>),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    #[error("Internal server error")]
    InternalServerError(#[from] std::io::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PasswordRequired(_) | Error::WrongPassword(_) => StatusCode::UNAUTHORIZED,
            Error::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Validation(_)
            | Error::JsonRejection(_)
            | Error::MultipartRejection(_)
            | Error::MissingField(_)
            | Error::UnsupportedFileFormat(_) => StatusCode::BAD_REQUEST,
            Error::ReqwestError(_) => StatusCode::BAD_GATEWAY,
            Error::MailNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Error::QrError(_)
            | Error::TemplateError(_)
            | Error::DatabaseError(_)
            | Error::PoolError(_)
            | Error::PoolRunError(_)
            | Error::ConfigError(_)
            | Error::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<garde::Report> for Error {
    fn from(report: garde::Report) -> Self {
        Error::Validation(
            report
                .iter()
                .map(|(path, error)| {
                    FieldError::new(camel_case(&path.to_string()), error.to_string())
                })
                .collect(),
        )
    }
}

/// garde reports Rust field names, the API speaks camelCase
fn camel_case(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut upper = false;
    for c in path.chars() {
        match c {
            '_' => upper = true,
            c if upper => {
                out.extend(c.to_uppercase());
                upper = false;
            }
            c => out.push(c),
        }
    }
    out
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            fields: Vec<FieldError>,
            #[serde(skip_serializing_if = "Option::is_none")]
            password_required: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<Uuid>,
        }

        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "{}", self);
        } else {
            debug!(%status, "{}", self);
        }

        let mut body = ErrorResponse {
            error: self.to_string(),
            fields: Vec::new(),
            password_required: None,
            id: None,
        };
        match self {
            Error::Validation(fields) => body.fields = fields,
            Error::PasswordRequired(id) | Error::WrongPassword(id) => {
                body.password_required = Some(true);
                body.id = Some(id);
            }
            _ => {}
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_reported_in_camel_case() {
        assert_eq!(camel_case("invoice.company_name"), "invoice.companyName");
        assert_eq!(camel_case("line_items[1].rate"), "lineItems[1].rate");
        assert_eq!(camel_case("to"), "to");
    }

    #[test]
    fn taxonomy_maps_to_distinct_statuses() {
        assert_eq!(Error::NotFound("Invoice").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Validation(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::PasswordRequired(Uuid::nil()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::MailNotConfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
