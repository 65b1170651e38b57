//! Core types for the market engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (unsigned integer credit amounts)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credit amount in indivisible units
pub type Amount = u64;

/// Index into a project's option list
pub type OptionIndex = u32;

/// Account identifier (opaque address-like key, authenticated by the host)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reserved account holding tickets while they are listed for resale.
    ///
    /// No external caller is authenticated under this id; the order book
    /// moves tickets in and out of it with crate-internal transfers.
    pub fn order_book_escrow() -> Self {
        Self("orderbook.escrow".to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Project identifier (sequential, starting at 1)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ProjectId(u64);

/// Ticket identifier (sequential, starting at 1)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TicketId(u64);

/// Order identifier (sequential, starting at 1)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OrderId(u64);

macro_rules! impl_sequential_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw id value
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Raw id value
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_sequential_id!(ProjectId);
impl_sequential_id!(TicketId);
impl_sequential_id!(OrderId);

/// Project lifecycle state
///
/// `Open` is initial, `Settled` terminal; there are no other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    /// Accepting ticket purchases until the deadline
    Open,
    /// Winning option declared, pool being claimed
    Settled,
}

/// An escrow-backed prediction market with a fixed option set and deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project ID
    pub id: ProjectId,

    /// Account that created the project and may settle it
    pub creator: AccountId,

    /// Display title
    pub title: String,

    /// Mutually-exclusive outcome labels (at least two, fixed at creation)
    pub options: Vec<String>,

    /// Escrowed prize pool in credits
    pub pool_balance: Amount,

    /// Purchase cutoff and earliest settlement time (fixed at creation)
    pub deadline: DateTime<Utc>,

    /// Lifecycle state
    pub state: ProjectState,

    /// Winning option, recorded at settlement
    pub winning_option: Option<OptionIndex>,

    /// Tickets sold per option, indexed by option
    pub option_ticket_counts: Vec<u64>,

    /// Per-ticket payout fixed at settlement (None while open, and for
    /// settlements with no winning tickets)
    pub payout_per_ticket: Option<Amount>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Whether the project still accepts purchases (ignoring the deadline)
    pub fn is_open(&self) -> bool {
        self.state == ProjectState::Open
    }

    /// Total tickets minted for this project
    pub fn total_tickets(&self) -> u64 {
        self.option_ticket_counts.iter().sum()
    }

    /// Number of tickets holding the winning option (settled projects only)
    pub fn winning_ticket_count(&self) -> Option<u64> {
        self.winning_option
            .map(|w| self.option_ticket_counts[w as usize])
    }
}

/// A transferable receipt proving a purchase of one option in one project
///
/// Provenance fields are immutable; only `owner` and `approved_operator`
/// change after mint. Tickets are never destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,

    /// Current owner
    pub owner: AccountId,

    /// Project this ticket belongs to
    pub project_id: ProjectId,

    /// Option the buyer backed
    pub option_index: OptionIndex,

    /// Price paid at mint time
    pub purchase_price: Amount,

    /// Mint timestamp
    pub purchase_time: DateTime<Utc>,

    /// Single delegated transfer approval (cleared on every transfer)
    pub approved_operator: Option<AccountId>,
}

/// Order lifecycle state
///
/// `Filled` and `Cancelled` are terminal; an order never re-activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Standing offer, ticket in escrow
    Active,
    /// Matched with a buyer
    Filled,
    /// Withdrawn by the seller
    Cancelled,
}

impl OrderState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Cancelled)
    }
}

/// A standing offer to sell a specific ticket at a fixed price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: OrderId,

    /// Account that listed the ticket
    pub seller: AccountId,

    /// Ticket held in escrow while this order is active
    pub ticket_id: TicketId,

    /// Project the ticket belongs to (denormalized at listing time)
    pub project_id: ProjectId,

    /// Option the ticket backs (denormalized at listing time)
    pub option_index: OptionIndex,

    /// Ask price in credits
    pub price: Amount,

    /// Lifecycle state
    pub state: OrderState,

    /// Listing timestamp
    pub create_time: DateTime<Utc>,
}

impl Order {
    /// Whether the order can still be filled or cancelled
    pub fn is_active(&self) -> bool {
        self.state == OrderState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_id_display() {
        assert_eq!(ProjectId::new(7).to_string(), "7");
        assert_eq!(TicketId::new(7).value(), 7);
    }

    #[test]
    fn test_order_state_terminal() {
        assert!(!OrderState::Active.is_terminal());
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn test_project_total_tickets() {
        let project = Project {
            id: ProjectId::new(1),
            creator: AccountId::new("alice"),
            title: "Champion".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            pool_balance: 10,
            deadline: Utc::now(),
            state: ProjectState::Open,
            winning_option: None,
            option_ticket_counts: vec![3, 2],
            payout_per_ticket: None,
            created_at: Utc::now(),
        };
        assert_eq!(project.total_tickets(), 5);
        assert_eq!(project.winning_ticket_count(), None);
    }
}
