//! # Courtbook Core
//!
//! The financial correctness engine of the Courtbook booking platform:
//! domain model, store traits and the services that guarantee exactly-once
//! financial recording under concurrent, at-least-once-delivered inputs.
//!
//! ## Architecture
//!
//! - **Ledger**: append-only record of financial movements, idempotent on a
//!   unique key per logical event
//! - **Wallet projector**: per-user store-credit balance maintained as a
//!   transactionally-consistent projection of wallet entries
//! - **Outbox**: domain events written in the same transaction as the state
//!   change they describe, consumed asynchronously
//! - **Lifecycle**: the reservation state machine, including the timeout
//!   sweep over abandoned unpaid holds
//! - **Promotion engine**: validated, non-replayable discount and bonus
//!   grants
//! - **Reconciliation**: periodic idempotent backfill of missed entries
//!
//! All multi-step financial updates are single store operations, executed
//! by implementations inside one local ACID transaction. Cross-request
//! idempotency comes from unique keys, not locks.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod order;
pub mod outbox;
pub mod promotion;
pub mod reservation;
pub mod services;
pub mod store;
pub mod types;
pub mod wallet;

pub use error::{CoreError, Result};
