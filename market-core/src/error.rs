//! Error types for the market engine
//!
//! Variants are grouped by the recovery they demand from the caller:
//! validation errors are safe to retry with corrected input, authorization
//! errors need a different caller, state-conflict errors signal a stale
//! view, and value-mismatch errors need an adjusted amount. No error is
//! ever partially applied.

use crate::types::{Amount, OptionIndex, OrderId, ProjectId, TicketId};
use thiserror::Error;

/// Result type for market operations
pub type Result<T> = std::result::Result<T, Error>;

/// Market engine errors
#[derive(Error, Debug)]
pub enum Error {
    // Validation

    /// Projects need at least two options
    #[error("a project needs at least two options")]
    InvalidOptions,

    /// Deadline must lie in the future at creation time
    #[error("deadline must be in the future")]
    InvalidDeadline,

    /// Initial escrow must be positive
    #[error("initial escrow must be positive")]
    InvalidEscrow,

    /// Option index out of range for the project
    #[error("option index {0} out of range")]
    InvalidOption(OptionIndex),

    /// Ask price must be positive
    #[error("price must be positive")]
    InvalidPrice,

    // Authorization

    /// Caller does not own the ticket
    #[error("caller is not the owner")]
    NotOwner,

    /// Caller holds neither ownership nor any approval for the ticket
    #[error("caller is not authorized to transfer this ticket")]
    NotAuthorized,

    /// Caller is not the project creator
    #[error("caller is not the project creator")]
    NotCreator,

    /// Caller is not the order's seller
    #[error("caller is not the order seller")]
    NotSeller,

    /// Delegated allowance too low
    #[error("insufficient allowance: need {needed}, have {available}")]
    InsufficientAllowance {
        /// Amount the transfer requires
        needed: Amount,
        /// Allowance currently granted
        available: Amount,
    },

    // State conflicts

    /// One-time grant (or payout) already taken
    #[error("already claimed")]
    AlreadyClaimed,

    /// Settlement was already performed
    #[error("project already settled")]
    AlreadySettled,

    /// Operation requires an open project
    #[error("project is settled")]
    ProjectSettled,

    /// Operation requires a settled project
    #[error("project is not settled")]
    ProjectNotSettled,

    /// Purchases are closed once the deadline passes
    #[error("project deadline has passed")]
    ProjectExpired,

    /// Settlement must wait for the deadline
    #[error("project deadline has not passed yet")]
    NotYetExpired,

    /// Order is filled or cancelled
    #[error("order is not active")]
    OrderNotActive,

    /// The ticket already has an active order
    #[error("ticket already has an active order")]
    AlreadyListed,

    /// No active orders in the requested market segment
    #[error("no active orders for this market")]
    NoActiveOrders,

    /// The ticket did not back the winning option
    #[error("ticket did not back the winning option")]
    NotWinningTicket,

    /// The ticket belongs to a different project
    #[error("ticket belongs to a different project")]
    WrongProject,

    /// The pool is reserved for winning-ticket claims
    #[error("pool is reserved for winning tickets")]
    PoolNotReclaimable,

    // Value mismatches

    /// Attached payment does not match the required amount
    #[error("wrong payment: expected {expected}, got {actual}")]
    WrongPayment {
        /// Amount the operation requires
        expected: Amount,
        /// Amount the caller attached
        actual: Amount,
    },

    /// Account balance too low
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount the operation requires
        needed: Amount,
        /// Balance currently held
        available: Amount,
    },

    // Not found

    /// No project under this id
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// No ticket under this id
    #[error("unknown ticket: {0}")]
    UnknownTicket(TicketId),

    /// No order under this id
    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    // Infrastructure

    /// Storage error (RocksDB)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invariant violation (conservation, custody, log continuity)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
