use std::sync::Arc;

use crate::catalog::CatalogClient;
use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::relay::{Relay, SessionOptions};

/// Application-wide state shared across handlers
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Relay service (sessions, registry, launch counter)
    pub relay: Arc<Relay>,
    /// Source catalog client
    pub catalog: CatalogClient,
    /// Event bus for real-time notifications
    pub events: Arc<EventBus>,
}

impl AppState {
    pub fn new(config: ConfigStore, events: Arc<EventBus>) -> Arc<Self> {
        let catalog = CatalogClient::new(config.get().catalog.clone());
        Arc::new(Self {
            relay: Arc::new(Relay::new(events.clone())),
            config,
            catalog,
            events,
        })
    }

    /// Session settings for a connection accepted now
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from_config(&self.config.get())
    }

    /// Catalog client using the current catalog settings
    pub fn catalog(&self) -> CatalogClient {
        self.catalog.with_config(self.config.get().catalog.clone())
    }
}
