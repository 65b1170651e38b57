//! Main market orchestration layer
//!
//! This module ties together the engine, storage, and actor components
//! into a high-level async API, one method per operation.
//!
//! # Example
//!
//! ```no_run
//! use market_core::{AccountId, Config, Market};
//!
//! #[tokio::main]
//! async fn main() -> market_core::Result<()> {
//!     let config = Config::default();
//!     let market = Market::open(config).await?;
//!
//!     let granted = market.grant(&AccountId::new("alice")).await?;
//!     println!("granted {granted} credits");
//!
//!     market.shutdown().await
//! }
//! ```

use crate::actor::{spawn_market_actor, MarketHandle};
use crate::clock::{Clock, SystemClock};
use crate::engine::MarketEngine;
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{
    AccountId, Amount, OptionIndex, Order, OrderId, Project, ProjectId, Ticket, TicketId,
};
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Main market interface
pub struct Market {
    /// Actor handle for all operations
    handle: MarketHandle,

    /// Durable event log (shared with the actor)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,
}

impl Market {
    /// Open the market with wall-clock time, replaying any existing log
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Box::new(SystemClock)).await
    }

    /// Open with an injected clock (manual clocks drive deadline tests)
    pub async fn open_with_clock(config: Config, clock: Box<dyn Clock>) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);

        let mut engine = MarketEngine::new(config.engine_params(), clock);
        let events = storage.read_all()?;
        for event in &events {
            engine.apply_event(event)?;
        }
        if !events.is_empty() {
            engine.check_credit_conservation()?;
            tracing::info!(replayed = events.len(), "state rebuilt from event log");
        }

        let metrics = Metrics::new()
            .map_err(|e| crate::Error::Config(format!("metrics registry: {e}")))?;
        let handle = spawn_market_actor(engine, storage.clone(), metrics.clone());

        Ok(Self {
            handle,
            storage,
            metrics,
        })
    }

    // Credit Ledger

    /// Take the one-time credit grant
    pub async fn grant(&self, caller: &AccountId) -> Result<Amount> {
        self.handle.grant(caller.clone()).await
    }

    /// Transfer credits to another account
    pub async fn transfer_credits(
        &self,
        caller: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.handle
            .transfer_credits(caller.clone(), to.clone(), amount)
            .await
    }

    /// Set a spender's allowance over the caller's balance
    pub async fn approve_credits(
        &self,
        caller: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.handle
            .approve_credits(caller.clone(), spender.clone(), amount)
            .await
    }

    /// Delegated transfer; the caller spends their allowance
    pub async fn transfer_credits_from(
        &self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.handle
            .transfer_credits_from(caller.clone(), from.clone(), to.clone(), amount)
            .await
    }

    /// Credit balance of an account
    pub async fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        self.handle.balance_of(account.clone()).await
    }

    /// Remaining allowance for `(owner, spender)`
    pub async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<Amount> {
        self.handle.allowance(owner.clone(), spender.clone()).await
    }

    // Ticket Registry

    /// Set the delegated approval for a ticket the caller owns
    pub async fn approve_ticket(
        &self,
        caller: &AccountId,
        ticket_id: TicketId,
        operator: &AccountId,
    ) -> Result<()> {
        self.handle
            .approve_ticket(caller.clone(), ticket_id, operator.clone())
            .await
    }

    /// Grant or revoke a blanket operator approval
    pub async fn set_approval_for_all(
        &self,
        caller: &AccountId,
        operator: &AccountId,
        enabled: bool,
    ) -> Result<()> {
        self.handle
            .set_approval_for_all(caller.clone(), operator.clone(), enabled)
            .await
    }

    /// Transfer a ticket as owner or approved operator
    pub async fn transfer_ticket(
        &self,
        caller: &AccountId,
        ticket_id: TicketId,
        to: &AccountId,
    ) -> Result<()> {
        self.handle
            .transfer_ticket(caller.clone(), ticket_id, to.clone())
            .await
    }

    /// Current owner of a ticket
    pub async fn owner_of(&self, ticket_id: TicketId) -> Result<AccountId> {
        self.handle.owner_of(ticket_id).await
    }

    /// Full ticket record
    pub async fn ticket_info(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.handle.ticket_info(ticket_id).await
    }

    /// Tickets held by an account
    pub async fn tickets_of(&self, owner: &AccountId) -> Result<Vec<TicketId>> {
        self.handle.tickets_of(owner.clone()).await
    }

    // Project Ledger

    /// Open a new project, escrowing the initial pool from the caller
    pub async fn create_project(
        &self,
        caller: &AccountId,
        title: impl Into<String>,
        options: Vec<String>,
        deadline: DateTime<Utc>,
        initial_escrow: Amount,
    ) -> Result<ProjectId> {
        self.handle
            .create_project(caller.clone(), title.into(), options, deadline, initial_escrow)
            .await
    }

    /// Buy one ticket on an open project
    pub async fn buy_ticket(
        &self,
        caller: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<TicketId> {
        self.handle
            .buy_ticket(caller.clone(), project_id, option_index, payment)
            .await
    }

    /// Declare the winning option (creator only, after the deadline)
    pub async fn settle_project(
        &self,
        caller: &AccountId,
        project_id: ProjectId,
        winning_option: OptionIndex,
    ) -> Result<()> {
        self.handle
            .settle_project(caller.clone(), project_id, winning_option)
            .await
    }

    /// Pull one winning ticket's payout
    pub async fn claim_winnings(
        &self,
        caller: &AccountId,
        project_id: ProjectId,
        ticket_id: TicketId,
    ) -> Result<Amount> {
        self.handle
            .claim_winnings(caller.clone(), project_id, ticket_id)
            .await
    }

    /// Return an unwinnable pool to the creator
    pub async fn reclaim_pool(&self, caller: &AccountId, project_id: ProjectId) -> Result<Amount> {
        self.handle.reclaim_pool(caller.clone(), project_id).await
    }

    /// Project record
    pub async fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        self.handle.get_project(project_id).await
    }

    /// Option labels of a project
    pub async fn get_project_options(&self, project_id: ProjectId) -> Result<Vec<String>> {
        self.handle.get_project_options(project_id).await
    }

    /// Tickets sold for one option
    pub async fn get_option_ticket_count(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<u64> {
        self.handle
            .get_option_ticket_count(project_id, option_index)
            .await
    }

    /// All project ids, ascending
    pub async fn list_all_project_ids(&self) -> Result<Vec<ProjectId>> {
        self.handle.list_all_project_ids().await
    }

    // Order Book

    /// List a ticket for resale at a fixed price
    pub async fn list_ticket(
        &self,
        caller: &AccountId,
        ticket_id: TicketId,
        price: Amount,
    ) -> Result<OrderId> {
        self.handle
            .list_ticket(caller.clone(), ticket_id, price)
            .await
    }

    /// Withdraw an active order (seller only)
    pub async fn cancel_order(&self, caller: &AccountId, order_id: OrderId) -> Result<()> {
        self.handle.cancel_order(caller.clone(), order_id).await
    }

    /// Fill a specific active order
    pub async fn buy_from_order_book(
        &self,
        caller: &AccountId,
        order_id: OrderId,
        payment: Amount,
    ) -> Result<()> {
        self.handle
            .buy_from_order_book(caller.clone(), order_id, payment)
            .await
    }

    /// Fill the cheapest active order in a market segment
    pub async fn buy_at_best_price(
        &self,
        caller: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<OrderId> {
        self.handle
            .buy_at_best_price(caller.clone(), project_id, option_index, payment)
            .await
    }

    /// Active orders and prices for a market segment
    pub async fn get_order_book(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<(Vec<OrderId>, Vec<Amount>)> {
        self.handle.get_order_book(project_id, option_index).await
    }

    /// Order record (any state)
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.handle.get_order(order_id).await
    }

    /// Every order the account ever created
    pub async fn get_user_orders(&self, account: &AccountId) -> Result<Vec<OrderId>> {
        self.handle.get_user_orders(account.clone()).await
    }

    // Audit

    /// Recompute the event log's hash chain; returns the record count
    pub fn verify_event_log(&self) -> Result<u64> {
        self.storage.verify_chain()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown the market actor
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn test_config(temp: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();
        config.economy.ticket_price = 1;
        config.economy.grant_amount = 1000;
        config
    }

    #[tokio::test]
    async fn test_market_open_and_shutdown() {
        let temp = tempfile::tempdir().unwrap();
        let market = Market::open(test_config(&temp)).await.unwrap();
        market.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_market_survives_restart() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(&temp);
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");

        let clock = ManualClock::new(Utc::now());
        let deadline = clock.now() + Duration::hours(1);
        {
            let market = Market::open_with_clock(config.clone(), Box::new(clock.clone()))
                .await
                .unwrap();
            market.grant(&alice).await.unwrap();
            market.grant(&bob).await.unwrap();
            let project = market
                .create_project(
                    &alice,
                    "Champion",
                    vec!["A".to_string(), "B".to_string()],
                    deadline,
                    10,
                )
                .await
                .unwrap();
            market.buy_ticket(&bob, project, 0, 1).await.unwrap();
            market.shutdown().await.unwrap();
        }

        // Reopen from the same log and keep going
        let market = Market::open_with_clock(config, Box::new(clock.clone()))
            .await
            .unwrap();
        let project_ids = market.list_all_project_ids().await.unwrap();
        assert_eq!(project_ids.len(), 1);

        let project = market.get_project(project_ids[0]).await.unwrap();
        assert_eq!(project.pool_balance, 11);
        assert_eq!(market.balance_of(&bob).await.unwrap(), 999);

        // New state continues the same ticket sequence
        let ticket = market
            .buy_ticket(&bob, project_ids[0], 1, 1)
            .await
            .unwrap();
        assert_eq!(ticket, TicketId::new(2));

        assert_eq!(market.verify_event_log().unwrap(), 5);
        market.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_market_metrics_track_commits() {
        let temp = tempfile::tempdir().unwrap();
        let market = Market::open(test_config(&temp)).await.unwrap();

        market.grant(&AccountId::new("alice")).await.unwrap();
        market.grant(&AccountId::new("bob")).await.unwrap();
        assert_eq!(market.metrics().events_total.get(), 2);

        market.shutdown().await.unwrap();
    }
}
