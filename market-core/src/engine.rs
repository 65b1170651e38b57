//! Market engine: the serialized commit point for all four ledgers
//!
//! `MarketEngine` owns the credit ledger, ticket registry, project ledger,
//! and order book, plus the clock and the event sequence. Every mutating
//! operation reads "now" once, validates against a consistent snapshot,
//! applies its changes, and returns exactly one [`MarketEvent`]. Failed
//! operations change nothing and emit nothing.
//!
//! The engine is synchronous and single-threaded by construction; the actor
//! in [`crate::actor`] serializes access to it. Events are rich enough that
//! [`MarketEngine::apply_event`] can rebuild the full state from the log.

use crate::clock::Clock;
use crate::credits::CreditLedger;
use crate::error::{Error, Result};
use crate::events::{EventKind, MarketEvent};
use crate::orders::OrderBook;
use crate::projects::ProjectLedger;
use crate::tickets::TicketRegistry;
use crate::types::{
    AccountId, Amount, OptionIndex, Order, OrderId, OrderState, Project, ProjectId,
    ProjectState, Ticket, TicketId,
};
use chrono::{DateTime, Utc};
use std::fmt;

/// Economic parameters fixed at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineParams {
    /// Amount of the one-time credit grant
    pub grant_amount: Amount,

    /// Fixed price of every ticket
    pub ticket_price: Amount,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            grant_amount: 1000,
            ticket_price: 100,
        }
    }
}

/// The four ledgers behind one serializing access point
pub struct MarketEngine {
    params: EngineParams,
    clock: Box<dyn Clock>,
    credits: CreditLedger,
    tickets: TicketRegistry,
    projects: ProjectLedger,
    orders: OrderBook,
    sequence: u64,
}

impl fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketEngine")
            .field("params", &self.params)
            .field("sequence", &self.sequence)
            .field("tickets_minted", &self.tickets.total_minted())
            .finish_non_exhaustive()
    }
}

impl MarketEngine {
    /// Fresh engine with the given clock
    pub fn new(params: EngineParams, clock: Box<dyn Clock>) -> Self {
        Self {
            params,
            clock,
            credits: CreditLedger::new(),
            tickets: TicketRegistry::new(),
            projects: ProjectLedger::new(),
            orders: OrderBook::new(),
            sequence: 0,
        }
    }

    // Credit Ledger operations

    /// One-time credit grant for the caller
    pub fn grant(&mut self, caller: &AccountId) -> Result<(Amount, MarketEvent)> {
        let now = self.clock.now();
        let amount = self.params.grant_amount;
        self.credits.grant(caller, amount)?;
        let event = self.stamp(
            now,
            EventKind::CreditGranted {
                account: caller.clone(),
                amount,
            },
        );
        Ok((amount, event))
    }

    /// Move credits from the caller to another account
    pub fn transfer_credits(
        &mut self,
        caller: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        self.credits.transfer(caller, to, amount)?;
        let event = self.stamp(
            now,
            EventKind::CreditTransferred {
                from: caller.clone(),
                to: to.clone(),
                amount,
                spender: None,
            },
        );
        Ok(((), event))
    }

    /// Set a spender's allowance over the caller's balance
    pub fn approve_credits(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        self.credits.approve(caller, spender, amount);
        let event = self.stamp(
            now,
            EventKind::CreditApproved {
                owner: caller.clone(),
                spender: spender.clone(),
                amount,
            },
        );
        Ok(((), event))
    }

    /// Delegated credit transfer; the caller is the spender
    pub fn transfer_credits_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        self.credits.transfer_from(caller, from, to, amount)?;
        let event = self.stamp(
            now,
            EventKind::CreditTransferred {
                from: from.clone(),
                to: to.clone(),
                amount,
                spender: Some(caller.clone()),
            },
        );
        Ok(((), event))
    }

    // Ticket Registry operations

    /// Set the single delegated approval for a ticket the caller owns
    pub fn approve_ticket(
        &mut self,
        caller: &AccountId,
        ticket_id: TicketId,
        operator: &AccountId,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        self.tickets.approve(caller, ticket_id, operator)?;
        let event = self.stamp(
            now,
            EventKind::TicketApproved {
                ticket_id,
                owner: caller.clone(),
                operator: operator.clone(),
            },
        );
        Ok(((), event))
    }

    /// Grant or revoke a blanket operator approval for the caller's tickets
    pub fn set_approval_for_all(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        enabled: bool,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        self.tickets.set_approval_for_all(caller, operator, enabled);
        let event = self.stamp(
            now,
            EventKind::TicketApprovalForAll {
                owner: caller.clone(),
                operator: operator.clone(),
                enabled,
            },
        );
        Ok(((), event))
    }

    /// Transfer a ticket as its owner or an approved operator
    pub fn transfer_ticket(
        &mut self,
        caller: &AccountId,
        ticket_id: TicketId,
        to: &AccountId,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        let from = self.tickets.owner_of(ticket_id)?.clone();
        self.tickets.transfer(caller, ticket_id, to)?;
        let event = self.stamp(
            now,
            EventKind::TicketTransferred {
                ticket_id,
                from,
                to: to.clone(),
            },
        );
        Ok(((), event))
    }

    // Project Ledger operations

    /// Open a new project, escrowing the initial pool from the caller
    pub fn create_project(
        &mut self,
        caller: &AccountId,
        title: String,
        options: Vec<String>,
        deadline: DateTime<Utc>,
        initial_escrow: Amount,
    ) -> Result<(ProjectId, MarketEvent)> {
        let now = self.clock.now();
        let (id, kind) = self.projects.create_project(
            &mut self.credits,
            caller,
            title,
            options,
            deadline,
            initial_escrow,
            now,
        )?;
        let event = self.stamp(now, kind);
        Ok((id, event))
    }

    /// Buy one ticket on an open project
    pub fn buy_ticket(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<(TicketId, MarketEvent)> {
        let now = self.clock.now();
        let (id, kind) = self.projects.buy_ticket(
            &mut self.credits,
            &mut self.tickets,
            caller,
            project_id,
            option_index,
            payment,
            self.params.ticket_price,
            now,
        )?;
        let event = self.stamp(now, kind);
        Ok((id, event))
    }

    /// Declare the winning option (creator only, after the deadline)
    pub fn settle_project(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
        winning_option: OptionIndex,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        let kind = self
            .projects
            .settle_project(caller, project_id, winning_option, now)?;
        let event = self.stamp(now, kind);
        Ok(((), event))
    }

    /// Pull one winning ticket's payout from the pool
    pub fn claim_winnings(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
        ticket_id: TicketId,
    ) -> Result<(Amount, MarketEvent)> {
        let now = self.clock.now();
        let (amount, kind) = self.projects.claim_winnings(
            &mut self.credits,
            &self.tickets,
            caller,
            project_id,
            ticket_id,
        )?;
        let event = self.stamp(now, kind);
        Ok((amount, event))
    }

    /// Return an unwinnable pool to the creator
    pub fn reclaim_pool(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
    ) -> Result<(Amount, MarketEvent)> {
        let now = self.clock.now();
        let (amount, kind) =
            self.projects
                .reclaim_pool(&mut self.credits, caller, project_id)?;
        let event = self.stamp(now, kind);
        Ok((amount, event))
    }

    // Order Book operations

    /// List a ticket for resale at a fixed price
    pub fn list_ticket(
        &mut self,
        caller: &AccountId,
        ticket_id: TicketId,
        price: Amount,
    ) -> Result<(OrderId, MarketEvent)> {
        let now = self.clock.now();
        let (id, kind) = self.orders.list_ticket(
            &mut self.tickets,
            &self.projects,
            caller,
            ticket_id,
            price,
            now,
        )?;
        let event = self.stamp(now, kind);
        Ok((id, event))
    }

    /// Withdraw an active order (seller only)
    pub fn cancel_order(
        &mut self,
        caller: &AccountId,
        order_id: OrderId,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        let kind = self.orders.cancel_order(&mut self.tickets, caller, order_id)?;
        let event = self.stamp(now, kind);
        Ok(((), event))
    }

    /// Fill a specific active order
    pub fn buy_from_order_book(
        &mut self,
        caller: &AccountId,
        order_id: OrderId,
        payment: Amount,
    ) -> Result<((), MarketEvent)> {
        let now = self.clock.now();
        let kind = self.orders.buy_from_order_book(
            &mut self.credits,
            &mut self.tickets,
            caller,
            order_id,
            payment,
        )?;
        let event = self.stamp(now, kind);
        Ok(((), event))
    }

    /// Fill the cheapest active order in a market segment
    pub fn buy_at_best_price(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<(OrderId, MarketEvent)> {
        let now = self.clock.now();
        let (id, kind) = self.orders.buy_at_best_price(
            &mut self.credits,
            &mut self.tickets,
            caller,
            project_id,
            option_index,
            payment,
        )?;
        let event = self.stamp(now, kind);
        Ok((id, event))
    }

    // Reads (pure, latest committed state)

    /// Credit balance of an account
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.credits.balance_of(account)
    }

    /// Remaining credit allowance for `(owner, spender)`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.credits.allowance(owner, spender)
    }

    /// Current owner of a ticket
    pub fn owner_of(&self, ticket_id: TicketId) -> Result<AccountId> {
        Ok(self.tickets.owner_of(ticket_id)?.clone())
    }

    /// Full ticket record
    pub fn ticket_info(&self, ticket_id: TicketId) -> Result<Ticket> {
        Ok(self.tickets.info_of(ticket_id)?.clone())
    }

    /// Tickets held by an account
    pub fn tickets_of(&self, owner: &AccountId) -> Vec<TicketId> {
        self.tickets.tickets_of(owner)
    }

    /// Project record
    pub fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        Ok(self.projects.get(project_id)?.clone())
    }

    /// Option labels of a project
    pub fn get_project_options(&self, project_id: ProjectId) -> Result<Vec<String>> {
        Ok(self.projects.get_project_options(project_id)?.to_vec())
    }

    /// Tickets sold for one option
    pub fn get_option_ticket_count(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<u64> {
        self.projects.get_option_ticket_count(project_id, option_index)
    }

    /// All project ids, ascending
    pub fn list_all_project_ids(&self) -> Vec<ProjectId> {
        self.projects.list_all_project_ids()
    }

    /// Active orders and prices for a market segment
    pub fn get_order_book(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> (Vec<OrderId>, Vec<Amount>) {
        self.orders.get_order_book(project_id, option_index)
    }

    /// Order record (any state)
    pub fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.orders.get_order(order_id)?.clone())
    }

    /// Every order the account ever created
    pub fn get_user_orders(&self, account: &AccountId) -> Vec<OrderId> {
        self.orders.get_user_orders(account)
    }

    // Replay and invariants

    /// Re-apply a committed event to rebuild state from the log.
    ///
    /// Events must arrive in sequence order; a gap means the log and the
    /// engine have diverged, which is unrecoverable.
    pub fn apply_event(&mut self, event: &MarketEvent) -> Result<()> {
        if event.sequence != self.sequence {
            return Err(Error::InvariantViolation(format!(
                "event log gap: expected sequence {}, got {}",
                self.sequence, event.sequence
            )));
        }

        match &event.kind {
            EventKind::CreditGranted { account, amount } => {
                self.credits.grant(account, *amount)?;
            }
            EventKind::CreditApproved {
                owner,
                spender,
                amount,
            } => {
                self.credits.approve(owner, spender, *amount);
            }
            EventKind::CreditTransferred {
                from,
                to,
                amount,
                spender,
            } => match spender {
                Some(spender) => self.credits.transfer_from(spender, from, to, *amount)?,
                None => self.credits.transfer(from, to, *amount)?,
            },
            EventKind::TicketApproved {
                ticket_id,
                owner,
                operator,
            } => {
                self.tickets.approve(owner, *ticket_id, operator)?;
            }
            EventKind::TicketApprovalForAll {
                owner,
                operator,
                enabled,
            } => {
                self.tickets.set_approval_for_all(owner, operator, *enabled);
            }
            EventKind::TicketTransferred { ticket_id, to, .. } => {
                // Authorization was checked when the event was committed
                self.tickets.force_transfer(*ticket_id, to)?;
            }
            EventKind::ProjectCreated {
                project_id,
                creator,
                title,
                options,
                pool_balance,
                deadline,
            } => {
                self.credits.debit(creator, *pool_balance)?;
                self.projects.apply_created(Project {
                    id: *project_id,
                    creator: creator.clone(),
                    title: title.clone(),
                    options: options.clone(),
                    pool_balance: *pool_balance,
                    deadline: *deadline,
                    state: ProjectState::Open,
                    winning_option: None,
                    option_ticket_counts: vec![0; options.len()],
                    payout_per_ticket: None,
                    created_at: event.at,
                });
            }
            EventKind::TicketPurchased {
                project_id,
                ticket_id,
                buyer,
                option_index,
                price,
            } => {
                self.credits.debit(buyer, *price)?;
                self.projects
                    .apply_purchase(*project_id, *option_index, *price)?;
                let minted =
                    self.tickets
                        .mint(buyer, *project_id, *option_index, *price, event.at);
                if minted != *ticket_id {
                    return Err(Error::InvariantViolation(format!(
                        "replay minted ticket {minted}, log says {ticket_id}"
                    )));
                }
            }
            EventKind::ProjectSettled {
                project_id,
                winning_option,
                payout_per_ticket,
                ..
            } => {
                self.projects
                    .apply_settled(*project_id, *winning_option, *payout_per_ticket)?;
            }
            EventKind::WinningsClaimed {
                project_id,
                ticket_id,
                account,
                amount,
            } => {
                self.projects
                    .apply_claimed(*project_id, *ticket_id, *amount)?;
                self.credits.credit(account, *amount)?;
            }
            EventKind::PoolReclaimed {
                project_id,
                creator,
                amount,
            } => {
                self.projects.apply_reclaimed(*project_id, *amount)?;
                self.credits.credit(creator, *amount)?;
            }
            EventKind::OrderListed {
                order_id,
                ticket_id,
                project_id,
                option_index,
                seller,
                price,
            } => {
                self.tickets
                    .force_transfer(*ticket_id, &AccountId::order_book_escrow())?;
                self.orders.apply_listed(Order {
                    id: *order_id,
                    seller: seller.clone(),
                    ticket_id: *ticket_id,
                    project_id: *project_id,
                    option_index: *option_index,
                    price: *price,
                    state: OrderState::Active,
                    create_time: event.at,
                });
            }
            EventKind::OrderCancelled {
                order_id,
                ticket_id,
                seller,
            } => {
                self.tickets.force_transfer(*ticket_id, seller)?;
                self.orders.apply_cancelled(*order_id)?;
            }
            EventKind::OrderFilled {
                order_id,
                ticket_id,
                buyer,
                seller,
                price,
            } => {
                self.credits.debit(buyer, *price)?;
                self.credits.credit(seller, *price)?;
                self.tickets.force_transfer(*ticket_id, buyer)?;
                self.orders.apply_filled(*order_id)?;
            }
        }

        self.sequence += 1;
        Ok(())
    }

    /// Credit conservation: total granted equals the sum of balances plus
    /// unclaimed pool balances. Holds at every committed state.
    pub fn check_credit_conservation(&self) -> Result<()> {
        let balances = self.credits.sum_balances()?;
        let pools = self.projects.sum_pools()?;
        let held = balances
            .checked_add(pools)
            .ok_or_else(|| Error::InvariantViolation("conservation sum overflow".to_string()))?;
        if held != self.credits.total_granted() {
            return Err(Error::InvariantViolation(format!(
                "conservation broken: granted {} != balances {} + pools {}",
                self.credits.total_granted(),
                balances,
                pools
            )));
        }
        Ok(())
    }

    /// Next event sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Economic parameters
    pub fn params(&self) -> EngineParams {
        self.params
    }

    /// Credit ledger (read-only)
    pub fn credits(&self) -> &CreditLedger {
        &self.credits
    }

    /// Ticket registry (read-only)
    pub fn tickets(&self) -> &TicketRegistry {
        &self.tickets
    }

    /// Project ledger (read-only)
    pub fn projects(&self) -> &ProjectLedger {
        &self.projects
    }

    /// Order book (read-only)
    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    fn stamp(&mut self, at: DateTime<Utc>, kind: EventKind) -> MarketEvent {
        let event = MarketEvent {
            sequence: self.sequence,
            at,
            kind,
        };
        self.sequence += 1;
        tracing::debug!(sequence = event.sequence, kind = event.kind.name(), "event committed");
        event
    }
}
