//! Router configuration: the complete HTTP surface of the core.

use crate::handlers::{health, jobs, ledger, outbox, payments, promotions, reservations, wallet};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Builds the Axum router with every endpoint wired to `state`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Reservations
        .route("/reservations", post(reservations::create))
        .route("/reservations/:id", get(reservations::get))
        .route("/reservations/:id/cancel", post(reservations::cancel))
        .route("/reservations/:id/check-in", post(reservations::check_in))
        .route("/reservations/:id/complete", post(reservations::complete))
        .route("/reservations/:id/no-show", post(reservations::no_show))
        .route("/reservations/:id/price", post(reservations::override_price))
        // Normalized gateway callbacks
        .route("/payments/confirmed", post(payments::confirmed))
        .route("/payments/refunded", post(payments::refunded))
        // Scheduled-job triggers
        .route("/jobs/expire-reservations", get(jobs::expire_reservations))
        .route("/jobs/reconcile", get(jobs::reconcile))
        // Reporting
        .route("/ledger", get(ledger::query))
        // Promotions
        .route("/promotions/validate", post(promotions::validate))
        .route("/promotions/apply", post(promotions::apply))
        // Wallet
        .route("/wallet/topup", post(wallet::top_up))
        .route("/wallet/:user_id", get(wallet::get))
        // Outbox consumer contract
        .route("/outbox", get(outbox::poll))
        .route("/outbox/ack", post(outbox::ack));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
