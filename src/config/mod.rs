//! Configuration schema and file-backed store

mod schema;
mod store;

pub use schema::{AppConfig, AudioMode, CatalogConfig, RelayConfig, TranscoderConfig, WebConfig};
pub use store::{ConfigStore, RuntimeOverrides};
