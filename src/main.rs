use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::net::SocketAddr;

mod access;
mod api;
mod config;
mod database;
mod error;
mod hosting;
mod identity;
mod mailgun;
mod models;
mod money;
mod state;

#[rustfmt::skip]
mod schema;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() {
    let config = config::Config::from_env().expect("Invalid configuration");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "invoice_host=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = config.bind_addr;
    let state = state::State::new(config)
        .await
        .expect("Failed to initialize state");

    debug!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TcpListener");

    axum::serve(
        listener,
        api::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
