//! Project Ledger: escrowed prize pools and their lifecycle
//!
//! A project moves through exactly one transition, `Open -> Settled`. The
//! pool only grows while open (escrow at creation, then ticket payments)
//! and is only consumed by per-ticket claims after settlement. Payout is
//! pull-based: settlement fixes the per-ticket amount, winners claim it.
//!
//! Collaborating ledgers are injected per operation; this module owns no
//! credit balances and no tickets, only project state.

use crate::credits::CreditLedger;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::tickets::TicketRegistry;
use crate::types::{
    AccountId, Amount, OptionIndex, Project, ProjectId, ProjectState, TicketId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Ledger of all projects plus per-ticket claim bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLedger {
    projects: BTreeMap<ProjectId, Project>,
    claimed_tickets: HashSet<TicketId>,
    next_id: u64,
}

impl ProjectLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Open a new project, escrowing `initial_escrow` from the creator.
    #[allow(clippy::too_many_arguments)]
    pub fn create_project(
        &mut self,
        credits: &mut CreditLedger,
        creator: &AccountId,
        title: String,
        options: Vec<String>,
        deadline: DateTime<Utc>,
        initial_escrow: Amount,
        now: DateTime<Utc>,
    ) -> Result<(ProjectId, EventKind)> {
        if options.len() < 2 {
            return Err(Error::InvalidOptions);
        }
        if deadline <= now {
            return Err(Error::InvalidDeadline);
        }
        if initial_escrow == 0 {
            return Err(Error::InvalidEscrow);
        }
        credits.require_balance(creator, initial_escrow)?;

        credits.debit(creator, initial_escrow)?;
        let id = ProjectId::new(self.next_id);
        let project = Project {
            id,
            creator: creator.clone(),
            title: title.clone(),
            options: options.clone(),
            pool_balance: initial_escrow,
            deadline,
            state: ProjectState::Open,
            winning_option: None,
            option_ticket_counts: vec![0; options.len()],
            payout_per_ticket: None,
            created_at: now,
        };
        self.apply_created(project);

        tracing::info!(project_id = %id, creator = %creator, pool = initial_escrow, "project created");

        Ok((
            id,
            EventKind::ProjectCreated {
                project_id: id,
                creator: creator.clone(),
                title,
                options,
                pool_balance: initial_escrow,
                deadline,
            },
        ))
    }

    /// Buy one ticket on an open project.
    ///
    /// Payment, pool increment, option count, and mint are all-or-nothing:
    /// every check runs before the first mutation.
    #[allow(clippy::too_many_arguments)]
    pub fn buy_ticket(
        &mut self,
        credits: &mut CreditLedger,
        tickets: &mut TicketRegistry,
        buyer: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        payment: Amount,
        ticket_price: Amount,
        now: DateTime<Utc>,
    ) -> Result<(TicketId, EventKind)> {
        let project = self.get(project_id)?;
        if !project.is_open() {
            return Err(Error::ProjectSettled);
        }
        if now >= project.deadline {
            return Err(Error::ProjectExpired);
        }
        if (option_index as usize) >= project.options.len() {
            return Err(Error::InvalidOption(option_index));
        }
        if payment != ticket_price {
            return Err(Error::WrongPayment {
                expected: ticket_price,
                actual: payment,
            });
        }
        credits.require_balance(buyer, payment)?;

        credits.debit(buyer, payment)?;
        self.apply_purchase(project_id, option_index, payment)?;
        let ticket_id = tickets.mint(buyer, project_id, option_index, payment, now);

        tracing::debug!(
            project_id = %project_id,
            ticket_id = %ticket_id,
            buyer = %buyer,
            option_index,
            "ticket purchased"
        );

        Ok((
            ticket_id,
            EventKind::TicketPurchased {
                project_id,
                ticket_id,
                buyer: buyer.clone(),
                option_index,
                price: payment,
            },
        ))
    }

    /// Declare the winning option after the deadline.
    ///
    /// Fixes `payout_per_ticket = pool / winning_ticket_count` (integer
    /// division; the remainder stays in the pool). With zero winning
    /// tickets the pool stays intact for the creator to reclaim.
    pub fn settle_project(
        &mut self,
        caller: &AccountId,
        project_id: ProjectId,
        winning_option: OptionIndex,
        now: DateTime<Utc>,
    ) -> Result<EventKind> {
        let project = self.get(project_id)?;
        if &project.creator != caller {
            return Err(Error::NotCreator);
        }
        if now < project.deadline {
            return Err(Error::NotYetExpired);
        }
        if !project.is_open() {
            return Err(Error::AlreadySettled);
        }
        if (winning_option as usize) >= project.options.len() {
            return Err(Error::InvalidOption(winning_option));
        }

        let winning_tickets = project.option_ticket_counts[winning_option as usize];
        let payout_per_ticket = if winning_tickets > 0 {
            Some(project.pool_balance / winning_tickets)
        } else {
            None
        };
        self.apply_settled(project_id, winning_option, payout_per_ticket)?;

        tracing::info!(
            project_id = %project_id,
            winning_option,
            winning_tickets,
            payout = payout_per_ticket.unwrap_or(0),
            "project settled"
        );

        Ok(EventKind::ProjectSettled {
            project_id,
            winning_option,
            winning_tickets,
            payout_per_ticket,
        })
    }

    /// Pull one winning ticket's payout from the pool.
    ///
    /// Each winning ticket pays out once, to whoever owns it at claim time.
    pub fn claim_winnings(
        &mut self,
        credits: &mut CreditLedger,
        tickets: &TicketRegistry,
        caller: &AccountId,
        project_id: ProjectId,
        ticket_id: TicketId,
    ) -> Result<(Amount, EventKind)> {
        let project = self.get(project_id)?;
        if project.is_open() {
            return Err(Error::ProjectNotSettled);
        }
        let ticket = tickets.info_of(ticket_id)?;
        if ticket.project_id != project_id {
            return Err(Error::WrongProject);
        }
        if &ticket.owner != caller {
            return Err(Error::NotOwner);
        }
        if project.winning_option != Some(ticket.option_index) {
            return Err(Error::NotWinningTicket);
        }
        if self.claimed_tickets.contains(&ticket_id) {
            return Err(Error::AlreadyClaimed);
        }
        let amount = project.payout_per_ticket.ok_or_else(|| {
            Error::InvariantViolation("winning ticket with no payout fixed".to_string())
        })?;

        self.apply_claimed(project_id, ticket_id, amount)?;
        credits.credit(caller, amount)?;

        tracing::debug!(
            project_id = %project_id,
            ticket_id = %ticket_id,
            account = %caller,
            amount,
            "winnings claimed"
        );

        Ok((
            amount,
            EventKind::WinningsClaimed {
                project_id,
                ticket_id,
                account: caller.clone(),
                amount,
            },
        ))
    }

    /// Return an unwinnable pool to the creator.
    ///
    /// Only available once settled with zero winning tickets; claimable once.
    pub fn reclaim_pool(
        &mut self,
        credits: &mut CreditLedger,
        caller: &AccountId,
        project_id: ProjectId,
    ) -> Result<(Amount, EventKind)> {
        let project = self.get(project_id)?;
        if project.is_open() {
            return Err(Error::ProjectNotSettled);
        }
        if &project.creator != caller {
            return Err(Error::NotCreator);
        }
        if project.winning_ticket_count() != Some(0) {
            return Err(Error::PoolNotReclaimable);
        }
        if project.pool_balance == 0 {
            return Err(Error::AlreadyClaimed);
        }

        let amount = project.pool_balance;
        self.apply_reclaimed(project_id, amount)?;
        credits.credit(caller, amount)?;

        tracing::info!(project_id = %project_id, creator = %caller, amount, "pool reclaimed");

        Ok((
            amount,
            EventKind::PoolReclaimed {
                project_id,
                creator: caller.clone(),
                amount,
            },
        ))
    }

    /// Project record
    pub fn get(&self, project_id: ProjectId) -> Result<&Project> {
        self.projects
            .get(&project_id)
            .ok_or(Error::UnknownProject(project_id))
    }

    /// Option labels of a project
    pub fn get_project_options(&self, project_id: ProjectId) -> Result<&[String]> {
        Ok(&self.get(project_id)?.options)
    }

    /// Tickets sold for one option of a project
    pub fn get_option_ticket_count(
        &self,
        project_id: ProjectId,
        option_index: OptionIndex,
    ) -> Result<u64> {
        let project = self.get(project_id)?;
        project
            .option_ticket_counts
            .get(option_index as usize)
            .copied()
            .ok_or(Error::InvalidOption(option_index))
    }

    /// All project ids, ascending
    pub fn list_all_project_ids(&self) -> Vec<ProjectId> {
        self.projects.keys().copied().collect()
    }

    /// Whether a ticket's payout was already claimed
    pub fn is_ticket_claimed(&self, ticket_id: TicketId) -> bool {
        self.claimed_tickets.contains(&ticket_id)
    }

    /// Sum of all pool balances (for the conservation check)
    pub fn sum_pools(&self) -> Result<Amount> {
        self.projects.values().try_fold(0u64, |acc, p| {
            acc.checked_add(p.pool_balance)
                .ok_or_else(|| Error::InvariantViolation("pool sum overflow".to_string()))
        })
    }

    // Replay-shared state mutations. The live operations above call these
    // after validation; `MarketEngine::apply_event` calls them directly.

    pub(crate) fn apply_created(&mut self, project: Project) {
        self.next_id = self.next_id.max(project.id.value() + 1);
        self.projects.insert(project.id, project);
    }

    pub(crate) fn apply_purchase(
        &mut self,
        project_id: ProjectId,
        option_index: OptionIndex,
        price: Amount,
    ) -> Result<()> {
        let project = self.get_mut(project_id)?;
        project.pool_balance = project.pool_balance.checked_add(price).ok_or_else(|| {
            Error::InvariantViolation("pool balance overflow".to_string())
        })?;
        project.option_ticket_counts[option_index as usize] += 1;
        Ok(())
    }

    pub(crate) fn apply_settled(
        &mut self,
        project_id: ProjectId,
        winning_option: OptionIndex,
        payout_per_ticket: Option<Amount>,
    ) -> Result<()> {
        let project = self.get_mut(project_id)?;
        project.state = ProjectState::Settled;
        project.winning_option = Some(winning_option);
        project.payout_per_ticket = payout_per_ticket;
        Ok(())
    }

    pub(crate) fn apply_claimed(
        &mut self,
        project_id: ProjectId,
        ticket_id: TicketId,
        amount: Amount,
    ) -> Result<()> {
        let project = self.get_mut(project_id)?;
        project.pool_balance = project.pool_balance.checked_sub(amount).ok_or_else(|| {
            Error::InvariantViolation("claim exceeds pool balance".to_string())
        })?;
        self.claimed_tickets.insert(ticket_id);
        Ok(())
    }

    pub(crate) fn apply_reclaimed(&mut self, project_id: ProjectId, amount: Amount) -> Result<()> {
        let project = self.get_mut(project_id)?;
        project.pool_balance = project.pool_balance.checked_sub(amount).ok_or_else(|| {
            Error::InvariantViolation("reclaim exceeds pool balance".to_string())
        })?;
        Ok(())
    }

    fn get_mut(&mut self, project_id: ProjectId) -> Result<&mut Project> {
        self.projects
            .get_mut(&project_id)
            .ok_or(Error::UnknownProject(project_id))
    }
}
