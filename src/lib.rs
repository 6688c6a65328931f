pub mod app;
pub mod aspects;
pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod category;
pub mod clock;
pub mod config;
pub mod currency;
pub mod ebay;
pub mod error;
pub mod executor;
pub mod http;
pub mod locks;
pub mod metrics;
pub mod models;
pub mod profile;
pub mod publish;
pub mod store;
pub mod unpublish;

#[cfg(test)]
mod testing;

pub use app::AppContext;
pub use config::AppConfig;
pub use error::{ErrorKind, MarketplaceFailure, OrchestratorError};
pub use publish::PublishReport;
pub use unpublish::{UnpublishReport, UnpublishScope};
