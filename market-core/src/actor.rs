//! Actor-based concurrency for the market engine
//!
//! This module implements the single-writer pattern using Tokio actors:
//! one logical writer task owns the engine and the event log, so every
//! operation (reads included) executes to completion with exclusive access
//! before the next message is admitted. That gives the total commit order
//! the engine's invariants rely on; no read-modify-write race is possible
//! because commits are serialized.
//!
//! A mutating operation commits in two steps inside one message: apply to
//! the engine, then append the emitted event to the durable log. An append
//! failure is fatal; the actor reports the error and stops rather than let
//! engine state diverge from the log.

use crate::engine::MarketEngine;
use crate::error::{Error, Result};
use crate::events::MarketEvent;
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{
    AccountId, Amount, OptionIndex, Order, OrderId, Project, ProjectId, Ticket, TicketId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the market actor
pub enum MarketMessage {
    /// One-time credit grant
    Grant {
        /// Claiming account
        account: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Credit transfer from the caller
    TransferCredits {
        /// Debited caller
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Amount to move
        amount: Amount,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Allowance update
    ApproveCredits {
        /// Balance owner (caller)
        owner: AccountId,
        /// Approved spender
        spender: AccountId,
        /// New allowance
        amount: Amount,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Delegated credit transfer
    TransferCreditsFrom {
        /// Spender (caller)
        spender: AccountId,
        /// Debited account
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Amount to move
        amount: Amount,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Per-ticket approval
    ApproveTicket {
        /// Ticket owner (caller)
        caller: AccountId,
        /// Ticket to approve
        ticket_id: TicketId,
        /// Approved operator
        operator: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Blanket operator approval
    SetApprovalForAll {
        /// Granting owner (caller)
        caller: AccountId,
        /// Operator covered
        operator: AccountId,
        /// Grant or revoke
        enabled: bool,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Direct ticket transfer
    TransferTicket {
        /// Authorized caller
        caller: AccountId,
        /// Ticket to move
        ticket_id: TicketId,
        /// New owner
        to: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Open a new project
    CreateProject {
        /// Creator (escrow source)
        creator: AccountId,
        /// Display title
        title: String,
        /// Outcome labels
        options: Vec<String>,
        /// Purchase cutoff
        deadline: DateTime<Utc>,
        /// Initial pool
        initial_escrow: Amount,
        /// Result channel
        response: oneshot::Sender<Result<ProjectId>>,
    },

    /// Buy one ticket
    BuyTicket {
        /// Paying buyer
        buyer: AccountId,
        /// Target project
        project_id: ProjectId,
        /// Backed option
        option_index: OptionIndex,
        /// Attached payment
        payment: Amount,
        /// Result channel
        response: oneshot::Sender<Result<TicketId>>,
    },

    /// Declare the winning option
    SettleProject {
        /// Creator (caller)
        caller: AccountId,
        /// Project to settle
        project_id: ProjectId,
        /// Declared winner
        winning_option: OptionIndex,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Pull a winning ticket's payout
    ClaimWinnings {
        /// Ticket owner (caller)
        caller: AccountId,
        /// Settled project
        project_id: ProjectId,
        /// Winning ticket
        ticket_id: TicketId,
        /// Result channel
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Return an unwinnable pool to the creator
    ReclaimPool {
        /// Creator (caller)
        caller: AccountId,
        /// Settled project
        project_id: ProjectId,
        /// Result channel
        response: oneshot::Sender<Result<Amount>>,
    },

    /// List a ticket for resale
    ListTicket {
        /// Ticket owner (caller)
        seller: AccountId,
        /// Ticket to list
        ticket_id: TicketId,
        /// Ask price
        price: Amount,
        /// Result channel
        response: oneshot::Sender<Result<OrderId>>,
    },

    /// Withdraw an active order
    CancelOrder {
        /// Seller (caller)
        caller: AccountId,
        /// Order to cancel
        order_id: OrderId,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Fill a specific order
    BuyFromOrderBook {
        /// Paying buyer
        buyer: AccountId,
        /// Order to fill
        order_id: OrderId,
        /// Attached payment
        payment: Amount,
        /// Result channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Fill the cheapest order in a segment
    BuyAtBestPrice {
        /// Paying buyer
        buyer: AccountId,
        /// Project segment
        project_id: ProjectId,
        /// Option segment
        option_index: OptionIndex,
        /// Attached payment
        payment: Amount,
        /// Result channel
        response: oneshot::Sender<Result<OrderId>>,
    },

    /// Credit balance read
    BalanceOf {
        /// Queried account
        account: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Allowance read
    Allowance {
        /// Balance owner
        owner: AccountId,
        /// Spender
        spender: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Ticket owner read
    OwnerOf {
        /// Queried ticket
        ticket_id: TicketId,
        /// Result channel
        response: oneshot::Sender<Result<AccountId>>,
    },

    /// Ticket record read
    TicketInfo {
        /// Queried ticket
        ticket_id: TicketId,
        /// Result channel
        response: oneshot::Sender<Result<Ticket>>,
    },

    /// Portfolio read
    TicketsOf {
        /// Queried owner
        owner: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<Vec<TicketId>>>,
    },

    /// Project record read
    GetProject {
        /// Queried project
        project_id: ProjectId,
        /// Result channel
        response: oneshot::Sender<Result<Project>>,
    },

    /// Project options read
    GetProjectOptions {
        /// Queried project
        project_id: ProjectId,
        /// Result channel
        response: oneshot::Sender<Result<Vec<String>>>,
    },

    /// Per-option ticket count read
    GetOptionTicketCount {
        /// Queried project
        project_id: ProjectId,
        /// Queried option
        option_index: OptionIndex,
        /// Result channel
        response: oneshot::Sender<Result<u64>>,
    },

    /// All project ids read
    ListAllProjectIds {
        /// Result channel
        response: oneshot::Sender<Result<Vec<ProjectId>>>,
    },

    /// Market segment read (active orders + prices)
    GetOrderBook {
        /// Queried project
        project_id: ProjectId,
        /// Queried option
        option_index: OptionIndex,
        /// Result channel
        response: oneshot::Sender<Result<(Vec<OrderId>, Vec<Amount>)>>,
    },

    /// Order record read
    GetOrder {
        /// Queried order
        order_id: OrderId,
        /// Result channel
        response: oneshot::Sender<Result<Order>>,
    },

    /// Seller history read
    GetUserOrders {
        /// Queried seller
        account: AccountId,
        /// Result channel
        response: oneshot::Sender<Result<Vec<OrderId>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes market messages
pub struct MarketActor {
    /// The engine (exclusively owned)
    engine: MarketEngine,

    /// Durable event log
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<MarketMessage>,

    /// Set when the log rejected an append; no further commits are safe
    fatal: bool,
}

impl MarketActor {
    /// Create new actor
    pub fn new(
        engine: MarketEngine,
        storage: Arc<Storage>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<MarketMessage>,
    ) -> Self {
        Self {
            engine,
            storage,
            metrics,
            mailbox,
            fatal: false,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, MarketMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
            if self.fatal {
                tracing::error!("event log append failed; market actor stopping");
                break;
            }
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: MarketMessage) {
        match msg {
            MarketMessage::Grant { account, response } => {
                let result = self.engine.grant(&account);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::TransferCredits {
                from,
                to,
                amount,
                response,
            } => {
                let result = self.engine.transfer_credits(&from, &to, amount);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::ApproveCredits {
                owner,
                spender,
                amount,
                response,
            } => {
                let result = self.engine.approve_credits(&owner, &spender, amount);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::TransferCreditsFrom {
                spender,
                from,
                to,
                amount,
                response,
            } => {
                let result = self
                    .engine
                    .transfer_credits_from(&spender, &from, &to, amount);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::ApproveTicket {
                caller,
                ticket_id,
                operator,
                response,
            } => {
                let result = self.engine.approve_ticket(&caller, ticket_id, &operator);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::SetApprovalForAll {
                caller,
                operator,
                enabled,
                response,
            } => {
                let result = self.engine.set_approval_for_all(&caller, &operator, enabled);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::TransferTicket {
                caller,
                ticket_id,
                to,
                response,
            } => {
                let result = self.engine.transfer_ticket(&caller, ticket_id, &to);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::CreateProject {
                creator,
                title,
                options,
                deadline,
                initial_escrow,
                response,
            } => {
                let result =
                    self.engine
                        .create_project(&creator, title, options, deadline, initial_escrow);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::BuyTicket {
                buyer,
                project_id,
                option_index,
                payment,
                response,
            } => {
                let result = self
                    .engine
                    .buy_ticket(&buyer, project_id, option_index, payment);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::SettleProject {
                caller,
                project_id,
                winning_option,
                response,
            } => {
                let result = self
                    .engine
                    .settle_project(&caller, project_id, winning_option);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::ClaimWinnings {
                caller,
                project_id,
                ticket_id,
                response,
            } => {
                let result = self.engine.claim_winnings(&caller, project_id, ticket_id);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::ReclaimPool {
                caller,
                project_id,
                response,
            } => {
                let result = self.engine.reclaim_pool(&caller, project_id);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::ListTicket {
                seller,
                ticket_id,
                price,
                response,
            } => {
                let result = self.engine.list_ticket(&seller, ticket_id, price);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::CancelOrder {
                caller,
                order_id,
                response,
            } => {
                let result = self.engine.cancel_order(&caller, order_id);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::BuyFromOrderBook {
                buyer,
                order_id,
                payment,
                response,
            } => {
                let result = self.engine.buy_from_order_book(&buyer, order_id, payment);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::BuyAtBestPrice {
                buyer,
                project_id,
                option_index,
                payment,
                response,
            } => {
                let result =
                    self.engine
                        .buy_at_best_price(&buyer, project_id, option_index, payment);
                let _ = response.send(self.commit(result));
            }

            MarketMessage::BalanceOf { account, response } => {
                let _ = response.send(Ok(self.engine.balance_of(&account)));
            }

            MarketMessage::Allowance {
                owner,
                spender,
                response,
            } => {
                let _ = response.send(Ok(self.engine.allowance(&owner, &spender)));
            }

            MarketMessage::OwnerOf {
                ticket_id,
                response,
            } => {
                let _ = response.send(self.engine.owner_of(ticket_id));
            }

            MarketMessage::TicketInfo {
                ticket_id,
                response,
            } => {
                let _ = response.send(self.engine.ticket_info(ticket_id));
            }

            MarketMessage::TicketsOf { owner, response } => {
                let _ = response.send(Ok(self.engine.tickets_of(&owner)));
            }

            MarketMessage::GetProject {
                project_id,
                response,
            } => {
                let _ = response.send(self.engine.get_project(project_id));
            }

            MarketMessage::GetProjectOptions {
                project_id,
                response,
            } => {
                let _ = response.send(self.engine.get_project_options(project_id));
            }

            MarketMessage::GetOptionTicketCount {
                project_id,
                option_index,
                response,
            } => {
                let _ = response.send(self.engine.get_option_ticket_count(project_id, option_index));
            }

            MarketMessage::ListAllProjectIds { response } => {
                let _ = response.send(Ok(self.engine.list_all_project_ids()));
            }

            MarketMessage::GetOrderBook {
                project_id,
                option_index,
                response,
            } => {
                let _ = response.send(Ok(self.engine.get_order_book(project_id, option_index)));
            }

            MarketMessage::GetOrder { order_id, response } => {
                let _ = response.send(self.engine.get_order(order_id));
            }

            MarketMessage::GetUserOrders { account, response } => {
                let _ = response.send(Ok(self.engine.get_user_orders(&account)));
            }

            MarketMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Make a successful mutation durable: append the event, then record
    /// metrics. An append failure poisons the actor.
    fn commit<T>(&mut self, result: Result<(T, MarketEvent)>) -> Result<T> {
        let (value, event) = result?;
        let start = Instant::now();
        if let Err(e) = self.storage.append_event(&event) {
            self.fatal = true;
            return Err(e);
        }
        self.metrics.record_event(&event);
        self.metrics
            .record_commit_duration(start.elapsed().as_secs_f64());
        Ok(value)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct MarketHandle {
    sender: mpsc::Sender<MarketMessage>,
}

impl MarketHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<MarketMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> MarketMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("market mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("market response channel closed".to_string()))?
    }

    /// One-time credit grant for `account`
    pub async fn grant(&self, account: AccountId) -> Result<Amount> {
        self.call(|response| MarketMessage::Grant { account, response })
            .await
    }

    /// Credit transfer
    pub async fn transfer_credits(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.call(|response| MarketMessage::TransferCredits {
            from,
            to,
            amount,
            response,
        })
        .await
    }

    /// Allowance update
    pub async fn approve_credits(
        &self,
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.call(|response| MarketMessage::ApproveCredits {
            owner,
            spender,
            amount,
            response,
        })
        .await
    }

    /// Delegated credit transfer
    pub async fn transfer_credits_from(
        &self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.call(|response| MarketMessage::TransferCreditsFrom {
            spender,
            from,
            to,
            amount,
            response,
        })
        .await
    }

    /// Per-ticket approval
    pub async fn approve_ticket(
        &self,
        caller: AccountId,
        ticket_id: TicketId,
        operator: AccountId,
    ) -> Result<()> {
        self.call(|response| MarketMessage::ApproveTicket {
            caller,
            ticket_id,
            operator,
            response,
        })
        .await
    }

    /// Blanket operator approval
    pub async fn set_approval_for_all(
        &self,
        caller: AccountId,
        operator: AccountId,
        enabled: bool,
    ) -> Result<()> {
        self.call(|response| MarketMessage::SetApprovalForAll {
            caller,
            operator,
            enabled,
            response,
        })
        .await
    }

    /// Direct ticket transfer
    pub async fn transfer_ticket(
        &self,
        caller: AccountId,
        ticket_id: TicketId,
        to: AccountId,
    ) -> Result<()> {
        self.call(|response| MarketMessage::TransferTicket {
            caller,
            ticket_id,
            to,
            response,
        })
        .await
    }

    /// Open a new project
    pub async fn create_project(
        &self,
        creator: AccountId,
        title: String,
        options: Vec<String>,
        deadline: DateTime<Utc>,
        initial_escrow: Amount,
    ) -> Result<ProjectId> {
        self.call(|response| MarketMessage::CreateProject {
            creator,
            title,
            options,
            deadline,
            initial_escrow,
            response,
        })
        .await
    }

    /// Buy one ticket
    pub async fn buy_ticket(
        &self,
        buyer: AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<TicketId> {
        self.call(|response| MarketMessage::BuyTicket {
            buyer,
            project_id,
            option_index,
            payment,
            response,
        })
        .await
    }

    /// Declare the winning option
    pub async fn settle_project(
        &self,
        caller: AccountId,
        project_id: ProjectId,
        winning_option: OptionIndex,
    ) -> Result<()> {
        self.call(|response| MarketMessage::SettleProject {
            caller,
            project_id,
            winning_option,
            response,
        })
        .await
    }

    /// Pull a winning ticket's payout
    pub async fn claim_winnings(
        &self,
        caller: AccountId,
        project_id: ProjectId,
        ticket_id: TicketId,
    ) -> Result<Amount> {
        self.call(|response| MarketMessage::ClaimWinnings {
            caller,
            project_id,
            ticket_id,
            response,
        })
        .await
    }

    /// Return an unwinnable pool to the creator
    pub async fn reclaim_pool(&self, caller: AccountId, project_id: ProjectId) -> Result<Amount> {
        self.call(|response| MarketMessage::ReclaimPool {
            caller,
            project_id,
            response,
        })
        .await
    }

    /// List a ticket for resale
    pub async fn list_ticket(
        &self,
        seller: AccountId,
        ticket_id: TicketId,
        price: Amount,
    ) -> Result<OrderId> {
        self.call(|response| MarketMessage::ListTicket {
            seller,
            ticket_id,
            price,
            response,
        })
        .await
    }

    /// Withdraw an active order
    pub async fn cancel_order(&self, caller: AccountId, order_id: OrderId) -> Result<()> {
        self.call(|response| MarketMessage::CancelOrder {
            caller,
            order_id,
            response,
        })
        .await
    }

    /// Fill a specific order
    pub async fn buy_from_order_book(
        &self,
        buyer: AccountId,
        order_id: OrderId,
        payment: Amount,
    ) -> Result<()> {
        self.call(|response| MarketMessage::BuyFromOrderBook {
            buyer,
            order_id,
            payment,
            response,
        })
        .await
    }

    /// Fill the cheapest order in a segment
    pub async fn buy_at_best_price(
        &self,
        buyer: AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
    ) -> Result<OrderId> {
        self.call(|response| MarketMessage::BuyAtBestPrice {
            buyer,
            project_id,
            option_index,
            payment,
            response,
        })
        .await
    }

    /// Credit balance read
    pub async fn balance_of(&self, account: AccountId) -> Result<Amount> {
        self.call(|response| MarketMessage::BalanceOf { account, response })
            .await
    }

    /// Allowance read
    pub async fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<Amount> {
        self.call(|response| MarketMessage::Allowance {
            owner,
            spender,
            response,
        })
        .await
    }

    /// Ticket owner read
    pub async fn owner_of(&self, ticket_id: TicketId) -> Result<AccountId> {
        self.call(|response| MarketMessage::OwnerOf {
            ticket_id,
            response,
        })
        .await
    }

    /// Ticket record read
    pub async fn ticket_info(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.call(|response| MarketMessage::TicketInfo {
            ticket_id,
            response,
        })
        .await
    }

    /// Portfolio read
    pub async fn tickets_of(&self, owner: AccountId) -> Result<Vec<TicketId>> {
        self.call(|response| MarketMessage::TicketsOf { owner, response })
            .await
    }

    /// Project record read
    pub async fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        self.call(|response| MarketMessage::GetProject {
            project_id,
            response,
        })
        .await
    }

    /// Project options read
    pub async fn get_project_options(&self, project_id: ProjectId) -> Result<Vec<String>> {
        self.call(|response| MarketMessage::GetProjectOptions {
            project_id,
            response,
        })
        .await
    }

    /// Per-option ticket count read
    pub async fn get_option_ticket_count(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<u64> {
        self.call(|response| MarketMessage::GetOptionTicketCount {
            project_id,
            option_index,
            response,
        })
        .await
    }

    /// All project ids read
    pub async fn list_all_project_ids(&self) -> Result<Vec<ProjectId>> {
        self.call(|response| MarketMessage::ListAllProjectIds { response })
            .await
    }

    /// Market segment read
    pub async fn get_order_book(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<(Vec<OrderId>, Vec<Amount>)> {
        self.call(|response| MarketMessage::GetOrderBook {
            project_id,
            option_index,
            response,
        })
        .await
    }

    /// Order record read
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.call(|response| MarketMessage::GetOrder { order_id, response })
            .await
    }

    /// Seller history read
    pub async fn get_user_orders(&self, account: AccountId) -> Result<Vec<OrderId>> {
        self.call(|response| MarketMessage::GetUserOrders { account, response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MarketMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("market mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the market actor
pub fn spawn_market_actor(
    engine: MarketEngine,
    storage: Arc<Storage>,
    metrics: Metrics,
) -> MarketHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = MarketActor::new(engine, storage, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    MarketHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::Config;
    use chrono::{Duration, Utc};

    fn spawn_test_actor(temp: &tempfile::TempDir) -> (MarketHandle, ManualClock) {
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();
        config.economy.ticket_price = 1;

        let clock = ManualClock::new(Utc::now());
        let engine = MarketEngine::new(config.engine_params(), Box::new(clock.clone()));
        let storage = Arc::new(Storage::open(&config).unwrap());
        let metrics = Metrics::new().unwrap();
        (spawn_market_actor(engine, storage, metrics), clock)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let temp = tempfile::tempdir().unwrap();
        let (handle, _clock) = spawn_test_actor(&temp);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_serializes_operations() {
        let temp = tempfile::tempdir().unwrap();
        let (handle, clock) = spawn_test_actor(&temp);

        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");
        handle.grant(alice.clone()).await.unwrap();
        handle.grant(bob.clone()).await.unwrap();

        let project = handle
            .create_project(
                alice.clone(),
                "Champion".to_string(),
                vec!["A".to_string(), "B".to_string()],
                clock.now() + Duration::hours(1),
                10,
            )
            .await
            .unwrap();

        let ticket = handle
            .buy_ticket(bob.clone(), project, 0, 1)
            .await
            .unwrap();
        assert_eq!(handle.owner_of(ticket).await.unwrap(), bob);
        assert_eq!(handle.balance_of(bob.clone()).await.unwrap(), 999);

        let fetched = handle.get_project(project).await.unwrap();
        assert_eq!(fetched.pool_balance, 11);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_concurrent_grants_settle_into_total_order() {
        let temp = tempfile::tempdir().unwrap();
        let (handle, _clock) = spawn_test_actor(&temp);

        let mut joins = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move {
                handle.grant(AccountId::new(format!("account-{i}"))).await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        // A duplicate grant still fails after the storm
        let err = handle
            .grant(AccountId::new("account-0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyClaimed));

        handle.shutdown().await.unwrap();
    }
}
