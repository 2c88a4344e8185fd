use crate::state::State;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::{get, post},
    Json, Router,
};
use serde_derive::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

pub mod invoices;
pub mod line_items;
pub mod logo;
pub mod public;
pub mod validation;

pub fn app(state: State) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.cors_origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(crate::access::PASSWORD_HEADER),
        ]);

    let api = Router::new()
        .route("/invoices", get(invoices::list).post(invoices::create))
        .route("/invoices/by-number/:number", get(invoices::by_number))
        .route(
            "/invoices/:id",
            get(invoices::get)
                .patch(invoices::update)
                .delete(invoices::delete),
        )
        .route("/invoices/:id/hosted-url", get(invoices::hosted_url))
        .route("/invoices/:id/qr", get(invoices::qr))
        .route("/invoices/:id/send-email", post(invoices::send_email))
        .route(
            "/invoices/:id/line-items",
            get(line_items::list).post(line_items::add),
        )
        .route(
            "/line-items/:id",
            get(line_items::get)
                .patch(line_items::update)
                .delete(line_items::delete),
        )
        .route("/public/invoices/:id", get(public::get))
        .route("/upload-logo", post(logo::upload));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(DefaultBodyLimit::disable())
        // Room for a 2 MiB logo plus the multipart framing
        .layer(RequestBodyLimitLayer::new(4 * 1024 * 1024))
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    commit: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        commit: env!("COMMIT_HASH"),
    })
}
