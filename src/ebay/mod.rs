pub mod account;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod inventory;
pub mod metadata;
pub mod offers;
pub mod taxonomy;

pub use auth::{
    EbayAuthError, OAuthTokenProvider, StaticTokenProvider, TokenProvider, TokenScope,
};
pub use client::EbayClient;
pub use config::{EbayConfig, EbayEnvironment};
pub use error::{CreateOutcome, UpstreamClass, UpstreamError};
pub use inventory::Removal;
