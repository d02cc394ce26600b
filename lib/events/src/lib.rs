//! Commit-then-publish transaction discipline: `TransactionGuard` and the
//! `EventBus`/`DomainEvent` it gates (§4.7).

pub mod bus;
pub mod guard;

pub use bus::{DomainEvent, EventBus, EventHandler};
pub use guard::{TransactionDriver, TransactionGuard};
