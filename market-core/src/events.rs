//! Event records emitted by the engine
//!
//! Every successful mutating operation emits exactly one [`MarketEvent`];
//! failed operations emit none. Events carry enough detail to rebuild the
//! full engine state by replay, and form the durable audit trail consumed
//! by external indexers.

use crate::types::{AccountId, Amount, OptionIndex, OrderId, ProjectId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Position in the total commit order (contiguous from 0)
    pub sequence: u64,

    /// Commit timestamp (also the operation's "now")
    pub at: DateTime<Utc>,

    /// What changed
    pub kind: EventKind,
}

/// One variant per mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// One-time credit grant taken
    CreditGranted {
        /// Receiving account
        account: AccountId,
        /// Granted amount
        amount: Amount,
    },

    /// Allowance set for a delegated spender
    CreditApproved {
        /// Balance owner
        owner: AccountId,
        /// Approved spender
        spender: AccountId,
        /// New allowance (overwrites any prior value)
        amount: Amount,
    },

    /// Credits moved between accounts
    ///
    /// `spender` is set when the transfer consumed an allowance.
    CreditTransferred {
        /// Debited account
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Transferred amount
        amount: Amount,
        /// Delegated spender, for `transfer_from`
        spender: Option<AccountId>,
    },

    /// Per-ticket transfer approval set
    TicketApproved {
        /// Ticket the approval covers
        ticket_id: TicketId,
        /// Ticket owner at approval time
        owner: AccountId,
        /// Approved operator
        operator: AccountId,
    },

    /// Blanket operator approval toggled
    TicketApprovalForAll {
        /// Granting owner
        owner: AccountId,
        /// Operator covered by the approval
        operator: AccountId,
        /// Whether the approval was granted or revoked
        enabled: bool,
    },

    /// Ticket ownership changed outside the order book
    TicketTransferred {
        /// Transferred ticket
        ticket_id: TicketId,
        /// Previous owner
        from: AccountId,
        /// New owner
        to: AccountId,
    },

    /// New project opened with its escrowed pool
    ProjectCreated {
        /// New project id
        project_id: ProjectId,
        /// Creator (escrow source)
        creator: AccountId,
        /// Display title
        title: String,
        /// Outcome labels
        options: Vec<String>,
        /// Initial escrow
        pool_balance: Amount,
        /// Purchase cutoff
        deadline: DateTime<Utc>,
    },

    /// Ticket minted against an open project
    TicketPurchased {
        /// Project purchased into
        project_id: ProjectId,
        /// Newly minted ticket
        ticket_id: TicketId,
        /// Buyer and initial owner
        buyer: AccountId,
        /// Backed option
        option_index: OptionIndex,
        /// Price paid (added to the pool)
        price: Amount,
    },

    /// Winning option declared; per-ticket payout fixed
    ProjectSettled {
        /// Settled project
        project_id: ProjectId,
        /// Declared winner
        winning_option: OptionIndex,
        /// Tickets holding the winning option
        winning_tickets: u64,
        /// Claimable amount per winning ticket (None with zero winners)
        payout_per_ticket: Option<Amount>,
    },

    /// Winning ticket's payout pulled from the pool
    WinningsClaimed {
        /// Settled project
        project_id: ProjectId,
        /// Winning ticket
        ticket_id: TicketId,
        /// Claiming owner
        account: AccountId,
        /// Credited amount
        amount: Amount,
    },

    /// Unwinnable pool returned to the creator
    PoolReclaimed {
        /// Settled project with zero winning tickets
        project_id: ProjectId,
        /// Creator receiving the pool
        creator: AccountId,
        /// Returned amount
        amount: Amount,
    },

    /// Ticket listed for resale, moved into escrow
    OrderListed {
        /// New order id
        order_id: OrderId,
        /// Listed ticket
        ticket_id: TicketId,
        /// Project segment (denormalized)
        project_id: ProjectId,
        /// Option segment (denormalized)
        option_index: OptionIndex,
        /// Listing seller
        seller: AccountId,
        /// Ask price
        price: Amount,
    },

    /// Listing withdrawn, ticket released to the seller
    OrderCancelled {
        /// Cancelled order
        order_id: OrderId,
        /// Released ticket
        ticket_id: TicketId,
        /// Seller the ticket returned to
        seller: AccountId,
    },

    /// Order matched: payment and ticket exchanged atomically
    OrderFilled {
        /// Filled order
        order_id: OrderId,
        /// Transferred ticket
        ticket_id: TicketId,
        /// Paying buyer and new owner
        buyer: AccountId,
        /// Paid seller
        seller: AccountId,
        /// Settled price
        price: Amount,
    },
}

impl EventKind {
    /// Stable name for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CreditGranted { .. } => "credit_granted",
            EventKind::CreditApproved { .. } => "credit_approved",
            EventKind::CreditTransferred { .. } => "credit_transferred",
            EventKind::TicketApproved { .. } => "ticket_approved",
            EventKind::TicketApprovalForAll { .. } => "ticket_approval_for_all",
            EventKind::TicketTransferred { .. } => "ticket_transferred",
            EventKind::ProjectCreated { .. } => "project_created",
            EventKind::TicketPurchased { .. } => "ticket_purchased",
            EventKind::ProjectSettled { .. } => "project_settled",
            EventKind::WinningsClaimed { .. } => "winnings_claimed",
            EventKind::PoolReclaimed { .. } => "pool_reclaimed",
            EventKind::OrderListed { .. } => "order_listed",
            EventKind::OrderCancelled { .. } => "order_cancelled",
            EventKind::OrderFilled { .. } => "order_filled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        let kind = EventKind::CreditGranted {
            account: AccountId::new("alice"),
            amount: 1000,
        };
        assert_eq!(kind.name(), "credit_granted");

        let kind = EventKind::OrderFilled {
            order_id: OrderId::new(1),
            ticket_id: TicketId::new(2),
            buyer: AccountId::new("bob"),
            seller: AccountId::new("carol"),
            price: 3,
        };
        assert_eq!(kind.name(), "order_filled");
    }

    #[test]
    fn test_event_round_trips_through_bincode() {
        let event = MarketEvent {
            sequence: 42,
            at: Utc::now(),
            kind: EventKind::TicketPurchased {
                project_id: ProjectId::new(1),
                ticket_id: TicketId::new(9),
                buyer: AccountId::new("bob"),
                option_index: 0,
                price: 100,
            },
        };

        let bytes = bincode::serialize(&event).unwrap();
        let back: MarketEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, event);
    }
}
