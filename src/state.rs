use crate::config::Config;
use crate::database::Store;
use crate::error::Error;
use crate::hosting::Hosting;
use crate::mailgun::Outbox;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(FromRef, Clone)]
pub struct State {
    pub store: Store,
    pub outbox: Outbox,
    pub hosting: Hosting,
    pub config: Arc<Config>,
}

impl State {
    pub async fn new(config: Config) -> Result<State, Error> {
        let store = Store::connect(&config).await?;
        let outbox = Outbox::from_config(config.mailgun.as_ref());
        Ok(State::with_parts(config, store, outbox))
    }

    /// Wires already constructed collaborators, used by tests
    pub fn with_parts(config: Config, store: Store, outbox: Outbox) -> State {
        State {
            hosting: Hosting::new(&config.public_base_url),
            store,
            outbox,
            config: Arc::new(config),
        }
    }
}
