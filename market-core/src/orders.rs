//! Order Book: peer-to-peer ticket resale
//!
//! Listing moves the ticket into the order book's escrow account, so the
//! seller cannot dispose of it while the order is active. Fills exchange
//! payment and ticket atomically: every check runs before the first
//! mutation, and the three legs (debit buyer, credit seller, move ticket)
//! cannot fail once validation has passed.

use crate::credits::CreditLedger;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::projects::ProjectLedger;
use crate::tickets::TicketRegistry;
use crate::types::{
    AccountId, Amount, OptionIndex, Order, OrderId, OrderState, ProjectId, TicketId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Resale order book with per-ticket and per-market indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    /// Active order per ticket; enforces at-most-one-active-order
    ticket_order: HashMap<TicketId, OrderId>,
    /// Active orders per (project, option) segment, in listing order
    market_index: BTreeMap<(ProjectId, OptionIndex), Vec<OrderId>>,
    /// Every order ever created per seller, for portfolio history
    seller_index: HashMap<AccountId, Vec<OrderId>>,
    next_id: u64,
}

impl OrderBook {
    /// Empty order book
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// List a ticket for resale, taking it into escrow.
    pub fn list_ticket(
        &mut self,
        tickets: &mut TicketRegistry,
        projects: &ProjectLedger,
        seller: &AccountId,
        ticket_id: TicketId,
        price: Amount,
        now: DateTime<Utc>,
    ) -> Result<(OrderId, EventKind)> {
        let ticket = tickets.info_of(ticket_id)?;
        // Index check first: a listed ticket sits in escrow, so the owner
        // check alone would report NotOwner to its own seller
        if self.ticket_order.contains_key(&ticket_id) {
            return Err(Error::AlreadyListed);
        }
        if &ticket.owner != seller {
            return Err(Error::NotOwner);
        }
        if price == 0 {
            return Err(Error::InvalidPrice);
        }
        let project_id = ticket.project_id;
        let option_index = ticket.option_index;
        if !projects.get(project_id)?.is_open() {
            return Err(Error::ProjectSettled);
        }

        let order_id = OrderId::new(self.next_id);
        let order = Order {
            id: order_id,
            seller: seller.clone(),
            ticket_id,
            project_id,
            option_index,
            price,
            state: OrderState::Active,
            create_time: now,
        };
        tickets.force_transfer(ticket_id, &AccountId::order_book_escrow())?;
        self.apply_listed(order);

        tracing::debug!(
            order_id = %order_id,
            ticket_id = %ticket_id,
            seller = %seller,
            price,
            "ticket listed"
        );

        Ok((
            order_id,
            EventKind::OrderListed {
                order_id,
                ticket_id,
                project_id,
                option_index,
                seller: seller.clone(),
                price,
            },
        ))
    }

    /// Withdraw an active order and release the ticket to the seller.
    pub fn cancel_order(
        &mut self,
        tickets: &mut TicketRegistry,
        caller: &AccountId,
        order_id: OrderId,
    ) -> Result<EventKind> {
        let order = self.get_order(order_id)?;
        if &order.seller != caller {
            return Err(Error::NotSeller);
        }
        if !order.is_active() {
            return Err(Error::OrderNotActive);
        }
        let ticket_id = order.ticket_id;
        let seller = order.seller.clone();

        tickets.force_transfer(ticket_id, &seller)?;
        self.apply_cancelled(order_id)?;

        tracing::debug!(order_id = %order_id, ticket_id = %ticket_id, "order cancelled");

        Ok(EventKind::OrderCancelled {
            order_id,
            ticket_id,
            seller,
        })
    }

    /// Fill a specific active order: payment to the seller, ticket to the
    /// buyer, order terminal. All-or-nothing.
    pub fn buy_from_order_book(
        &mut self,
        credits: &mut CreditLedger,
        tickets: &mut TicketRegistry,
        buyer: &AccountId,
        order_id: OrderId,
        payment: Amount,
    ) -> Result<EventKind> {
        let order = self.get_order(order_id)?;
        if !order.is_active() {
            return Err(Error::OrderNotActive);
        }
        if payment != order.price {
            return Err(Error::WrongPayment {
                expected: order.price,
                actual: payment,
            });
        }
        credits.require_balance(buyer, payment)?;

        let ticket_id = order.ticket_id;
        let seller = order.seller.clone();
        let price = order.price;

        credits.debit(buyer, price)?;
        credits.credit(&seller, price)?;
        tickets.force_transfer(ticket_id, buyer)?;
        self.apply_filled(order_id)?;

        tracing::debug!(
            order_id = %order_id,
            ticket_id = %ticket_id,
            buyer = %buyer,
            seller = %seller,
            price,
            "order filled"
        );

        Ok(EventKind::OrderFilled {
            order_id,
            ticket_id,
            buyer: buyer.clone(),
            seller,
            price,
        })
    }

    /// Fill the cheapest active order in a market segment.
    ///
    /// Ties break on earliest listing time, then lowest order id.
    pub fn buy_at_best_price(
        &mut self,
        credits: &mut CreditLedger,
        tickets: &mut TicketRegistry,
        buyer: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<(OrderId, EventKind)> {
        let order_id = self
            .best_order(project_id, option_index)
            .ok_or(Error::NoActiveOrders)?;
        let event = self.buy_from_order_book(credits, tickets, buyer, order_id, payment)?;
        Ok((order_id, event))
    }

    /// Active orders and their prices for one market segment.
    ///
    /// Relative order is listing order, stable within a single read.
    pub fn get_order_book(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> (Vec<OrderId>, Vec<Amount>) {
        let ids = self
            .market_index
            .get(&(project_id, option_index))
            .cloned()
            .unwrap_or_default();
        let prices = ids.iter().map(|id| self.orders[id].price).collect();
        (ids, prices)
    }

    /// Order record (any state)
    pub fn get_order(&self, order_id: OrderId) -> Result<&Order> {
        self.orders
            .get(&order_id)
            .ok_or(Error::UnknownOrder(order_id))
    }

    /// Every order the account ever created, terminal states included
    pub fn get_user_orders(&self, account: &AccountId) -> Vec<OrderId> {
        self.seller_index.get(account).cloned().unwrap_or_default()
    }

    /// Active order currently holding a ticket, if any
    pub fn active_order_for_ticket(&self, ticket_id: TicketId) -> Option<OrderId> {
        self.ticket_order.get(&ticket_id).copied()
    }

    fn best_order(&self, project_id: ProjectId, option_index: OptionIndex) -> Option<OrderId> {
        self.market_index
            .get(&(project_id, option_index))?
            .iter()
            .map(|id| &self.orders[id])
            .min_by_key(|order| (order.price, order.create_time, order.id))
            .map(|order| order.id)
    }

    // Replay-shared state mutations (see `MarketEngine::apply_event`).

    pub(crate) fn apply_listed(&mut self, order: Order) {
        self.next_id = self.next_id.max(order.id.value() + 1);
        self.ticket_order.insert(order.ticket_id, order.id);
        self.market_index
            .entry((order.project_id, order.option_index))
            .or_default()
            .push(order.id);
        self.seller_index
            .entry(order.seller.clone())
            .or_default()
            .push(order.id);
        self.orders.insert(order.id, order);
    }

    pub(crate) fn apply_cancelled(&mut self, order_id: OrderId) -> Result<()> {
        self.retire(order_id, OrderState::Cancelled)
    }

    pub(crate) fn apply_filled(&mut self, order_id: OrderId) -> Result<()> {
        self.retire(order_id, OrderState::Filled)
    }

    fn retire(&mut self, order_id: OrderId, state: OrderState) -> Result<()> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(Error::UnknownOrder(order_id))?;
        order.state = state;
        self.ticket_order.remove(&order.ticket_id);
        if let Some(segment) = self
            .market_index
            .get_mut(&(order.project_id, order.option_index))
        {
            segment.retain(|&id| id != order_id);
        }
        Ok(())
    }
}
