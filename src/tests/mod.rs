use crate::api::app;
use crate::config::Config;
use crate::database::{memory::MemoryStore, Store};
use crate::error::Error;
use crate::mailgun::{Mailer, OutgoingMail, Outbox};
use crate::state::State;
use axum::async_trait;
use axum::body::Body;
use axum::http::request::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;


pub const BASE_URL: &str = "https://invoices.example.com";

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with::<EnvFilter>("invoice_host=debug,tower_http=debug,axum::rejection=trace".into())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init()
    });
}

/// Keeps every mail instead of delivering it
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), Error> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub fn test_state(outbox: Outbox) -> State {
    init_tracing();
    let config = Config {
        public_base_url: String::from(BASE_URL),
        ..Config::default()
    };
    State::with_parts(config, Store::new(MemoryStore::default()), outbox)
}

pub fn test_server_with(outbox: Outbox) -> TestServer {
    TestServer::new(app(test_state(outbox))).unwrap()
}

/// Server with an in-memory store and a recording mailer
pub fn test_server() -> (TestServer, RecordingMailer) {
    let mailer = RecordingMailer::default();
    (test_server_with(Outbox::new(mailer.clone())), mailer)
}

/// Callers are told apart by their request metadata
pub fn as_user(request: TestRequest, agent: &'static str) -> TestRequest {
    request.add_header(header::USER_AGENT, HeaderValue::from_static(agent))
}

/// Two rows worth 125.00 with 10 % tax and no shipping
pub fn invoice_body() -> Value {
    json!({
        "invoice": {
            "invoiceNumber": "INV-001",
            "companyName": "Acme Design",
            "companyEmail": "billing@acme.test",
            "clientName": "Globex",
            "clientEmail": "ap@globex.test",
            "invoiceDate": "2024-09-01",
            "dueDate": "2024-09-30",
            "taxPercentage": "10",
            "shippingCost": "0",
        },
        "lineItems": [
            { "description": "Logo design", "quantity": 2, "rate": "50.00" },
            { "description": "Hosting", "quantity": 1, "rate": "25.00" },
        ],
    })
}

/// Creates an invoice as `agent` and returns the response body
pub async fn create_invoice(server: &TestServer, agent: &'static str, body: Value) -> Value {
    let response = as_user(server.post("/api/invoices"), agent)
        .json(&body)
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()
}

pub fn id_of(invoice: &Value) -> String {
    invoice["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health() {
    let app = app(test_state(Outbox::new(RecordingMailer::default())));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (server, _) = test_server();

    let response = server.get("/api/nothing-here").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
