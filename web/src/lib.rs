//! # Courtbook Web
//!
//! The HTTP surface over the Courtbook core: reservation and payment
//! endpoints, scheduled-job triggers, ledger reporting, promotions, wallet
//! and the outbox consumer contract, served with Axum.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
