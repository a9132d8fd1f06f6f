//! Consumer side of the audit-event pipeline: drains the logs queue into an
//! append-only store and serves the stored records to the dashboard.

pub mod api_error;
pub mod app;
pub mod config;
pub mod consumer;
pub mod log_handlers;
pub mod metrics;
pub mod store;

pub use app::{build_router, AppState};
