use std::sync::LazyLock;

use crate::error::Error;
use axum::{body::Bytes, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde_derive::{Deserialize, Serialize};

/// Logos are embedded into the invoice as data URIs, keep them small
pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;

static IMAGE_MIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^image/[a-z0-9.+-]+$").unwrap());

#[derive(TryFromMultipart)]
pub struct LogoForm {
    #[form_data(limit = "2MiB")]
    pub logo: FieldData<Bytes>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadedLogo {
    /// `data:<mime>;base64,<payload>`
    pub logo: String,
}

fn try_handle_file(field: FieldData<Bytes>) -> Result<UploadedLogo, Error> {
    let content_type = field
        .metadata
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream")
        .to_ascii_lowercase();

    if !IMAGE_MIME.is_match(&content_type) {
        return Err(Error::UnsupportedFileFormat(content_type));
    }
    if field.contents.len() > MAX_LOGO_BYTES {
        return Err(Error::FileTooLarge(MAX_LOGO_BYTES));
    }

    Ok(UploadedLogo {
        logo: format!(
            "data:{};base64,{}",
            content_type,
            STANDARD.encode(&field.contents)
        ),
    })
}

pub async fn upload(
    form: Result<TypedMultipart<LogoForm>, TypedMultipartError>,
) -> Result<Json<UploadedLogo>, Error> {
    let TypedMultipart(form) = form.map_err(|e| match e {
        TypedMultipartError::FieldTooLarge { .. } => Error::FileTooLarge(MAX_LOGO_BYTES),
        TypedMultipartError::MissingField { field_name } => Error::MissingField(field_name),
        e => Error::MultipartRejection(e),
    })?;

    let logo = try_handle_file(form.logo)?;
    debug!(bytes = logo.logo.len(), "encoded uploaded logo");
    Ok(Json(logo))
}
