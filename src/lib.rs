/// LearnHub - course marketplace service
///
/// Session resolution against a hosted auth provider, the multi-step course
/// purchase flow, the transaction ledger, the cached course catalog and the
/// HTTP API the admin dashboard and clients talk to.

pub mod account;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod mailer;
pub mod metrics;
pub mod provider;
pub mod purchase;
pub mod rate_limit;
pub mod retry;
pub mod server;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{HubError, HubResult};
