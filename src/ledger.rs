use crate::error::{MarketError, Result};
use crate::registry::AccountRegistry;
use crate::storage::Transaction;
use crate::types::{Asset, Role};
use ethers::types::Address;
use log::info;
use serde::{Deserialize, Serialize};

/// An account under one of its roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub account: Address,
    pub role: Role,
}

impl Holder {
    pub fn user(account: Address) -> Self {
        Self {
            account,
            role: Role::User,
        }
    }

    pub fn miner(account: Address) -> Self {
        Self {
            account,
            role: Role::Miner,
        }
    }
}

/// Asset movements. Every call runs inside the caller's transaction so it
/// commits or rolls back together with the state change that triggered it.
///
/// Rewards are escrowed from a user's balance when an order opens. The escrow
/// either goes back to the user or is settled to the taker.
pub trait Ledger: Send + Sync {
    /// Sets `amount` aside from the user's spendable balance
    fn lock(&self, tx: &mut Transaction<'_>, user: &Address, amount: &Asset) -> Result<()>;

    /// Returns escrowed `amount` to the user's spendable balance
    fn unlock(&self, tx: &mut Transaction<'_>, user: &Address, amount: &Asset) -> Result<()>;

    /// Pays escrowed `amount` of `user` to `to`
    fn settle(
        &self,
        tx: &mut Transaction<'_>,
        user: &Address,
        to: &Holder,
        amount: &Asset,
    ) -> Result<()>;

    fn balance(&self, tx: &Transaction<'_>, holder: &Holder) -> Result<Asset>;

    fn escrow(&self, tx: &Transaction<'_>, user: &Address) -> Result<Asset>;
}

/// Ledger over the balances kept by the account registry
#[derive(Debug, Clone)]
pub struct AccountLedger {
    accounts: AccountRegistry,
}

impl AccountLedger {
    pub fn new(accounts: AccountRegistry) -> Self {
        Self { accounts }
    }
}

impl Ledger for AccountLedger {
    fn lock(&self, tx: &mut Transaction<'_>, user: &Address, amount: &Asset) -> Result<()> {
        self.accounts.ensure_symbol(amount)?;
        let after = self.accounts.lock(tx, user, amount)?;
        info!(
            "(ledger) locked {} of {:?} (balance {}, escrow {})",
            amount, user, after.balance, after.escrow
        );
        Ok(())
    }

    fn unlock(&self, tx: &mut Transaction<'_>, user: &Address, amount: &Asset) -> Result<()> {
        self.accounts.ensure_symbol(amount)?;
        let after = self.accounts.unlock(tx, user, amount)?;
        info!(
            "(ledger) unlocked {} of {:?} (balance {}, escrow {})",
            amount, user, after.balance, after.escrow
        );
        Ok(())
    }

    fn settle(
        &self,
        tx: &mut Transaction<'_>,
        user: &Address,
        to: &Holder,
        amount: &Asset,
    ) -> Result<()> {
        self.accounts.ensure_symbol(amount)?;
        if *to == Holder::user(*user) {
            return Err(MarketError::InvalidInput(
                "cannot settle escrow to its own holder".into(),
            ));
        }
        // the receiver must exist before escrow is released
        self.accounts.get(tx, &to.account, to.role)?;

        let from_after = self.accounts.release(tx, user, amount)?;
        let to_after = self.accounts.credit(tx, &to.account, to.role, amount)?;

        info!(
            "(ledger) settled {} from escrow of {:?} (now {}) to {} {:?} (now {})",
            amount, user, from_after.escrow, to.role, to.account, to_after
        );
        Ok(())
    }

    fn balance(&self, tx: &Transaction<'_>, holder: &Holder) -> Result<Asset> {
        self.accounts.balance_of(tx, &holder.account, holder.role)
    }

    fn escrow(&self, tx: &Transaction<'_>, user: &Address) -> Result<Asset> {
        self.accounts.escrow_of(tx, user)
    }
}
