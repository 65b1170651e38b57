//! PrizeMarket Core
//!
//! Ledger engine for prize-escrow prediction markets: creators escrow a
//! pool against a fixed option set, participants buy transferable tickets,
//! the creator settles on a winning option, and tickets resell on a
//! peer-to-peer order book before settlement.
//!
//! # Architecture
//!
//! - **Four ledgers, one commit point**: credit balances, ticket ownership,
//!   project pools, and resale orders are owned by a single engine behind a
//!   single-writer actor
//! - **Event sourcing**: every committed mutation appends exactly one event
//!   to a hash-chained durable log; state is rebuilt by replay on open
//! - **All-or-nothing operations**: validation completes before the first
//!   mutation, so a failed call changes nothing and emits nothing
//!
//! # Invariants
//!
//! - Credit conservation: total granted == Σ balances + Σ pool balances
//! - Single ownership: every ticket has exactly one owner
//! - At most one active order per ticket
//! - Deterministic replay: same events, same state

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod clock;
pub mod config;
pub mod credits;
pub mod engine;
pub mod error;
pub mod events;
pub mod market;
pub mod metrics;
pub mod orders;
pub mod projects;
pub mod storage;
pub mod tickets;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::{EngineParams, MarketEngine};
pub use error::{Error, Result};
pub use events::{EventKind, MarketEvent};
pub use market::Market;
pub use storage::Storage;
pub use types::{
    AccountId, Amount, OptionIndex, Order, OrderId, OrderState, Project, ProjectId,
    ProjectState, Ticket, TicketId,
};
