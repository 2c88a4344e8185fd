//! Password gate in front of the public read path.
//!
//! Nothing is unlocked server side: every public read carries the password
//! again. Passwords are stored and compared as plain text, the comparison
//! runs in constant time. Hash the stored value before exposing this to
//! anything that matters.

use crate::error::Error;
use crate::models::{Invoice, PopulatedInvoice};
use subtle::ConstantTimeEq;

/// Request header carrying the password of a protected hosted invoice
pub const PASSWORD_HEADER: &str = "x-invoice-password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Not password protected
    Open,
    /// Protected and the supplied password matched
    Unlocked,
    /// Protected and no password was supplied
    PasswordRequired,
    /// Protected and the supplied password did not match
    WrongPassword,
}

/// `supplied` is the raw header value, any UTF-8 password compares byte for byte
pub fn check(invoice: &Invoice, supplied: Option<&[u8]>) -> Access {
    if !invoice.is_password_protected {
        return Access::Open;
    }

    let Some(supplied) = supplied else {
        return Access::PasswordRequired;
    };
    match invoice.password.as_deref() {
        Some(stored) if bool::from(stored.as_bytes().ct_eq(supplied)) => {
            Access::Unlocked
        }
        _ => Access::WrongPassword,
    }
}

/// Hands out the invoice only when it is open or unlocked, otherwise the
/// error carries nothing but the id
pub fn unlock(
    invoice: PopulatedInvoice,
    supplied: Option<&[u8]>,
) -> Result<PopulatedInvoice, Error> {
    let id = invoice.invoice.id;
    match check(&invoice.invoice, supplied) {
        Access::Open | Access::Unlocked => Ok(invoice),
        Access::PasswordRequired => Err(Error::PasswordRequired(id)),
        Access::WrongPassword => {
            warn!(%id, "wrong password for hosted invoice");
            Err(Error::WrongPassword(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::invoices::CreateInvoice;
    use crate::identity::UserId;
    use serde_json::json;

    fn invoice(protected: bool, password: Option<&str>) -> PopulatedInvoice {
        let request: CreateInvoice = serde_json::from_value(json!({
            "invoice": {
                "invoiceNumber": "INV-1",
                "companyName": "Acme",
                "companyEmail": "billing@acme.test",
                "clientName": "Client",
                "clientEmail": "client@example.test",
                "invoiceDate": "2024-09-01",
                "isHosted": true,
                "isPasswordProtected": protected,
                "password": password,
            },
            "lineItems": [{ "description": "Work", "quantity": 1, "rate": "10.00" }],
        }))
        .unwrap();
        let owner = UserId::resolve(None, Some("test"), None);
        PopulatedInvoice::build(&owner, request, chrono::Utc::now())
    }

    #[test]
    fn unprotected_is_open_regardless_of_password() {
        let invoice = invoice(false, None);

        assert_eq!(check(&invoice.invoice, None), Access::Open);
        assert_eq!(check(&invoice.invoice, Some("anything".as_bytes())), Access::Open);
    }

    #[test]
    fn protected_requires_exact_match() {
        let invoice = invoice(true, Some("abc"));

        assert_eq!(check(&invoice.invoice, None), Access::PasswordRequired);
        assert_eq!(check(&invoice.invoice, Some("abd".as_bytes())), Access::WrongPassword);
        assert_eq!(check(&invoice.invoice, Some("ab".as_bytes())), Access::WrongPassword);
        assert_eq!(check(&invoice.invoice, Some("ABC".as_bytes())), Access::WrongPassword);
        assert_eq!(check(&invoice.invoice, Some("abc".as_bytes())), Access::Unlocked);
    }

    #[test]
    fn protected_without_stored_password_stays_locked() {
        let mut invoice = invoice(true, Some("abc"));
        invoice.invoice.password = None;

        assert_eq!(check(&invoice.invoice, Some("".as_bytes())), Access::WrongPassword);
        assert_eq!(check(&invoice.invoice, Some("abc".as_bytes())), Access::WrongPassword);
    }

    #[test]
    fn locked_error_reveals_only_the_id() {
        let invoice = invoice(true, Some("abc"));
        let id = invoice.invoice.id;

        match unlock(invoice.clone(), None) {
            Err(Error::PasswordRequired(locked)) => assert_eq!(locked, id),
            other => panic!("expected password required, got {other:?}"),
        }
        match unlock(invoice.clone(), Some("nope".as_bytes())) {
            Err(Error::WrongPassword(locked)) => assert_eq!(locked, id),
            other => panic!("expected wrong password, got {other:?}"),
        }
        assert!(unlock(invoice, Some("abc".as_bytes())).is_ok());
    }

    #[test]
    fn non_ascii_passwords_unlock() {
        let invoice = invoice(true, Some("pässwörd"));

        assert_eq!(
            check(&invoice.invoice, Some("pässwörd".as_bytes())),
            Access::Unlocked
        );
        assert_eq!(
            check(&invoice.invoice, Some("passwort".as_bytes())),
            Access::WrongPassword
        );
    }
}
