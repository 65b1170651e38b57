//! Ticket Registry: non-fungible ownership records
//!
//! Tickets carry immutable provenance (project, option, price, time) and two
//! mutable fields: the owner and a single delegated approval. Minting is
//! crate-internal; only the purchase path creates tickets. Every transfer
//! path funnels through one authorization check.

use crate::error::{Error, Result};
use crate::types::{AccountId, Amount, OptionIndex, ProjectId, Ticket, TicketId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Registry of all minted tickets with ownership and approval state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketRegistry {
    tickets: BTreeMap<TicketId, Ticket>,
    owner_index: HashMap<AccountId, Vec<TicketId>>,
    blanket_approvals: HashSet<(AccountId, AccountId)>,
    next_id: u64,
}

impl TicketRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Mint a new ticket with the next sequential id.
    ///
    /// Crate-internal: only the project purchase path mints.
    pub(crate) fn mint(
        &mut self,
        owner: &AccountId,
        project_id: ProjectId,
        option_index: OptionIndex,
        price: Amount,
        time: DateTime<Utc>,
    ) -> TicketId {
        let id = TicketId::new(self.next_id);
        self.next_id += 1;

        self.tickets.insert(
            id,
            Ticket {
                id,
                owner: owner.clone(),
                project_id,
                option_index,
                purchase_price: price,
                purchase_time: time,
                approved_operator: None,
            },
        );
        self.owner_index.entry(owner.clone()).or_default().push(id);
        id
    }

    /// Current owner of a ticket
    pub fn owner_of(&self, id: TicketId) -> Result<&AccountId> {
        Ok(&self.info_of(id)?.owner)
    }

    /// Full ticket record
    pub fn info_of(&self, id: TicketId) -> Result<&Ticket> {
        self.tickets.get(&id).ok_or(Error::UnknownTicket(id))
    }

    /// Set the single delegated approval for a ticket (overwrites any prior)
    pub fn approve(
        &mut self,
        caller: &AccountId,
        id: TicketId,
        operator: &AccountId,
    ) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or(Error::UnknownTicket(id))?;
        if &ticket.owner != caller {
            return Err(Error::NotOwner);
        }
        ticket.approved_operator = Some(operator.clone());
        Ok(())
    }

    /// Grant or revoke an account-wide operator approval
    pub fn set_approval_for_all(&mut self, caller: &AccountId, operator: &AccountId, enabled: bool) {
        let key = (caller.clone(), operator.clone());
        if enabled {
            self.blanket_approvals.insert(key);
        } else {
            self.blanket_approvals.remove(&key);
        }
    }

    /// Whether `operator` holds a blanket approval from `owner`
    pub fn is_blanket_approved(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.blanket_approvals
            .contains(&(owner.clone(), operator.clone()))
    }

    /// Single authorization check consulted by every transfer path:
    /// owner, blanket approval, then per-ticket approval.
    pub fn is_authorized(&self, caller: &AccountId, ticket: &Ticket) -> bool {
        caller == &ticket.owner
            || self.is_blanket_approved(&ticket.owner, caller)
            || ticket.approved_operator.as_ref() == Some(caller)
    }

    /// Transfer a ticket on behalf of an authorized caller.
    ///
    /// Clears the per-ticket approval; blanket approvals persist.
    pub fn transfer(&mut self, caller: &AccountId, id: TicketId, to: &AccountId) -> Result<()> {
        let ticket = self.info_of(id)?;
        if !self.is_authorized(caller, ticket) {
            return Err(Error::NotAuthorized);
        }
        self.move_ownership(id, to)
    }

    /// Custody move that bypasses authorization.
    ///
    /// Crate-internal: used by the order book to move tickets in and out of
    /// escrow after its own checks have passed.
    pub(crate) fn force_transfer(&mut self, id: TicketId, to: &AccountId) -> Result<()> {
        self.info_of(id)?;
        self.move_ownership(id, to)
    }

    /// Tickets currently held by `owner`, in insertion order.
    ///
    /// Positional identity is not stable across transfers; callers must not
    /// rely on it.
    pub fn tickets_of(&self, owner: &AccountId) -> Vec<TicketId> {
        self.owner_index.get(owner).cloned().unwrap_or_default()
    }

    /// Total tickets ever minted
    pub fn total_minted(&self) -> u64 {
        self.tickets.len() as u64
    }

    fn move_ownership(&mut self, id: TicketId, to: &AccountId) -> Result<()> {
        let ticket = self
            .tickets
            .get_mut(&id)
            .ok_or(Error::UnknownTicket(id))?;
        let from = ticket.owner.clone();
        ticket.owner = to.clone();
        ticket.approved_operator = None;

        if let Some(held) = self.owner_index.get_mut(&from) {
            held.retain(|&t| t != id);
        }
        self.owner_index.entry(to.clone()).or_default().push(id);
        Ok(())
    }
}
