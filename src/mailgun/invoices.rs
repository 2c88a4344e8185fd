use super::OutgoingMail;
use crate::api::invoices::SendEmail;
use crate::error::Error;
use crate::models::{Invoice, PopulatedInvoice};
use askama::Template;

const DEFAULT_MESSAGE: &str = "Please find your invoice details below.";

#[derive(Template)]
#[template(path = "invoice_mail.html")]
struct InvoiceMailHtml<'a> {
    invoice: &'a Invoice,
    message: &'a str,
    total: &'a str,
    due_date: Option<&'a str>,
    company_phone: Option<&'a str>,
    view_url: &'a str,
}

#[derive(Template)]
#[template(path = "invoice_mail.txt")]
struct InvoiceMailText<'a> {
    invoice: &'a Invoice,
    message: &'a str,
    total: &'a str,
    due_date: Option<&'a str>,
    view_url: &'a str,
}

impl OutgoingMail {
    pub fn for_invoice(
        invoice: &PopulatedInvoice,
        request: &SendEmail,
        view_url: &str,
    ) -> Result<Self, Error> {
        let invoice = &invoice.invoice;
        let message = request
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MESSAGE);
        let total = format!("{} {}", invoice.total, invoice.currency);
        let due_date = invoice.due_date.as_deref();

        let text = InvoiceMailText {
            invoice,
            message,
            total: &total,
            due_date,
            view_url,
        }
        .render()?;
        let html = InvoiceMailHtml {
            invoice,
            message,
            total: &total,
            due_date,
            company_phone: invoice.company_phone.as_deref(),
            view_url,
        }
        .render()?;

        Ok(Self {
            to: request.to.clone(),
            subject: request.subject.clone(),
            text,
            html,
        })
    }
}
