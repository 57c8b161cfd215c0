//! HTTP handlers, grouped by surface.

pub mod health;
pub mod jobs;
pub mod ledger;
pub mod outbox;
pub mod payments;
pub mod promotions;
pub mod reservations;
pub mod wallet;
