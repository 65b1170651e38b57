//! Credit Ledger: fungible balances used as the engine's payment medium
//!
//! Every value-moving operation in the engine rides this ledger, so credit
//! conservation is a single checkable equation: total granted equals the
//! sum of account balances plus unclaimed pool balances.

use crate::error::{Error, Result};
use crate::types::{AccountId, Amount};
use std::collections::{HashMap, HashSet};

/// Fungible balance ledger with one-time grants and delegated allowances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditLedger {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    claimed: HashSet<AccountId>,
    total_granted: Amount,
}

impl CreditLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time grant; the second call for the same account fails
    pub fn grant(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        if self.claimed.contains(account) {
            return Err(Error::AlreadyClaimed);
        }
        self.claimed.insert(account.clone());
        self.total_granted = checked_add(self.total_granted, amount)?;
        self.credit(account, amount)
    }

    /// Move credits between accounts
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.require_balance(from, amount)?;
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Set a spender's allowance (overwrites any prior value)
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Delegated transfer, consuming allowance by the transferred amount
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let available = self.allowance(from, spender);
        if available < amount {
            return Err(Error::InsufficientAllowance {
                needed: amount,
                available,
            });
        }
        self.require_balance(from, amount)?;

        self.allowances
            .insert((from.clone(), spender.clone()), available - amount);
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Current balance (zero for unknown accounts)
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Remaining allowance for `(owner, spender)`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the account already took its grant
    pub fn has_claimed(&self, account: &AccountId) -> bool {
        self.claimed.contains(account)
    }

    /// Sum of all grants ever made
    pub fn total_granted(&self) -> Amount {
        self.total_granted
    }

    /// Sum of all current balances
    pub fn sum_balances(&self) -> Result<Amount> {
        self.balances
            .values()
            .try_fold(0u64, |acc, &b| checked_add(acc, b))
    }

    /// Fail unless `account` holds at least `amount`
    pub(crate) fn require_balance(&self, account: &AccountId, amount: Amount) -> Result<()> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(Error::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        Ok(())
    }

    /// Remove credits from an account; callers validate the balance first,
    /// so underflow here is a custody bug, not a caller error
    pub(crate) fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let balance = self.balance_of(account);
        let remaining = balance.checked_sub(amount).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "debit of {amount} exceeds balance {balance} for {account}"
            ))
        })?;
        self.balances.insert(account.clone(), remaining);
        Ok(())
    }

    /// Add credits to an account
    pub(crate) fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let balance = checked_add(self.balance_of(account), amount)?;
        self.balances.insert(account.clone(), balance);
        Ok(())
    }
}

fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b)
        .ok_or_else(|| Error::InvariantViolation("credit amount overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn bob() -> AccountId {
        AccountId::new("bob")
    }

    #[test]
    fn test_grant_once() {
        let mut credits = CreditLedger::new();
        credits.grant(&alice(), 1000).unwrap();
        assert_eq!(credits.balance_of(&alice()), 1000);
        assert_eq!(credits.total_granted(), 1000);

        let err = credits.grant(&alice(), 1000).unwrap_err();
        assert!(matches!(err, Error::AlreadyClaimed));
        assert_eq!(credits.balance_of(&alice()), 1000);
    }

    #[test]
    fn test_transfer_debits_and_credits() {
        let mut credits = CreditLedger::new();
        credits.grant(&alice(), 1000).unwrap();

        credits.transfer(&alice(), &bob(), 300).unwrap();
        assert_eq!(credits.balance_of(&alice()), 700);
        assert_eq!(credits.balance_of(&bob()), 300);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let mut credits = CreditLedger::new();
        credits.grant(&alice(), 100).unwrap();

        let err = credits.transfer(&alice(), &bob(), 101).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                needed: 101,
                available: 100
            }
        ));
        // Nothing moved
        assert_eq!(credits.balance_of(&alice()), 100);
        assert_eq!(credits.balance_of(&bob()), 0);
    }

    #[test]
    fn test_allowance_consumed_not_refilled() {
        let mut credits = CreditLedger::new();
        credits.grant(&alice(), 1000).unwrap();
        credits.approve(&alice(), &bob(), 500);

        credits
            .transfer_from(&bob(), &alice(), &bob(), 200)
            .unwrap();
        assert_eq!(credits.allowance(&alice(), &bob()), 300);
        assert_eq!(credits.balance_of(&bob()), 200);

        let err = credits
            .transfer_from(&bob(), &alice(), &bob(), 301)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_transfer_from_checks_balance_after_allowance() {
        let mut credits = CreditLedger::new();
        credits.grant(&alice(), 100).unwrap();
        credits.approve(&alice(), &bob(), 500);

        let err = credits
            .transfer_from(&bob(), &alice(), &bob(), 200)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        // Allowance untouched on failure
        assert_eq!(credits.allowance(&alice(), &bob()), 500);
    }

    #[test]
    fn test_approve_overwrites() {
        let mut credits = CreditLedger::new();
        credits.approve(&alice(), &bob(), 500);
        credits.approve(&alice(), &bob(), 50);
        assert_eq!(credits.allowance(&alice(), &bob()), 50);
    }
}
