use crate::error::{MarketError, Result};
use crate::storage::Transaction;
use crate::types::{AccountRecord, Asset, MinerAccount, Rating, Role, Symbol, UserAccount};
use crate::wallet::Authority;
use ethers::types::Address;
use log::info;

pub(crate) fn account_key(account: &Address, role: Role) -> Vec<u8> {
    format!("acct:{}:{:?}", role.as_str(), account).into_bytes()
}

/// User and Miner records plus their balance snapshots
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    admin: Address,
    symbol: Symbol,
}

impl AccountRegistry {
    pub fn new(admin: Address, symbol: Symbol) -> Self {
        Self { admin, symbol }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Privileged: only the marketplace admin registers accounts
    pub fn register(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        account: Address,
        role: Role,
    ) -> Result<AccountRecord> {
        auth.require(&self.admin)?;

        let key = account_key(&account, role);
        if tx.get::<AccountRecord>(&key)?.is_some() {
            return Err(MarketError::AlreadyRegistered { account, role });
        }

        let balance = Asset::zero(self.symbol.clone());
        let record = match role {
            Role::User => AccountRecord::User(UserAccount {
                account,
                escrow: balance.clone(),
                balance,
            }),
            Role::Miner => AccountRecord::Miner(MinerAccount {
                account,
                balance,
                star: None,
                ratings: 0,
            }),
        };
        tx.put(key, &record)?;

        info!("(registry) registered {} {:?}", role, account);
        Ok(record)
    }

    pub fn get(&self, tx: &Transaction<'_>, account: &Address, role: Role) -> Result<AccountRecord> {
        tx.get::<AccountRecord>(&account_key(account, role))?
            .ok_or(MarketError::NotRegistered {
                account: *account,
                role,
            })
    }

    pub fn balance_of(&self, tx: &Transaction<'_>, account: &Address, role: Role) -> Result<Asset> {
        Ok(self.get(tx, account, role)?.balance().clone())
    }

    /// Privileged: assets entering the market from outside
    pub fn fund(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        account: Address,
        role: Role,
        amount: &Asset,
    ) -> Result<Asset> {
        auth.require(&self.admin)?;
        self.ensure_symbol(amount)?;
        let balance = self.credit(tx, &account, role, amount)?;
        info!("(registry) funded {} {:?} with {}", role, account, amount);
        Ok(balance)
    }

    pub fn ensure_symbol(&self, amount: &Asset) -> Result<()> {
        if amount.symbol != self.symbol {
            return Err(MarketError::SymbolMismatch {
                expected: self.symbol.to_string(),
                actual: amount.symbol.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn credit(
        &self,
        tx: &mut Transaction<'_>,
        account: &Address,
        role: Role,
        amount: &Asset,
    ) -> Result<Asset> {
        let mut record = self.get(tx, account, role)?;
        let updated = record.balance().checked_add(amount)?;
        *record.balance_mut() = updated.clone();
        tx.put(account_key(account, role), &record)?;
        Ok(updated)
    }

    pub(crate) fn debit(
        &self,
        tx: &mut Transaction<'_>,
        account: &Address,
        role: Role,
        amount: &Asset,
    ) -> Result<Asset> {
        let mut record = self.get(tx, account, role)?;
        let updated = record.balance().checked_sub(amount)?;
        *record.balance_mut() = updated.clone();
        tx.put(account_key(account, role), &record)?;
        Ok(updated)
    }

    fn user(&self, tx: &Transaction<'_>, account: &Address) -> Result<UserAccount> {
        match self.get(tx, account, Role::User)? {
            AccountRecord::User(user) => Ok(user),
            AccountRecord::Miner(_) => Err(MarketError::Storage(format!(
                "user slot of {:?} holds a miner record",
                account
            ))),
        }
    }

    pub fn escrow_of(&self, tx: &Transaction<'_>, account: &Address) -> Result<Asset> {
        Ok(self.user(tx, account)?.escrow)
    }

    /// Moves `amount` from the user's balance into its escrow
    pub(crate) fn lock(
        &self,
        tx: &mut Transaction<'_>,
        account: &Address,
        amount: &Asset,
    ) -> Result<UserAccount> {
        let mut user = self.user(tx, account)?;
        user.balance = user.balance.checked_sub(amount)?;
        user.escrow = user.escrow.checked_add(amount)?;
        tx.put(account_key(account, Role::User), &AccountRecord::User(user.clone()))?;
        Ok(user)
    }

    /// Returns `amount` from escrow to the user's balance
    pub(crate) fn unlock(
        &self,
        tx: &mut Transaction<'_>,
        account: &Address,
        amount: &Asset,
    ) -> Result<UserAccount> {
        let mut user = self.user(tx, account)?;
        user.escrow = user.escrow.checked_sub(amount)?;
        user.balance = user.balance.checked_add(amount)?;
        tx.put(account_key(account, Role::User), &AccountRecord::User(user.clone()))?;
        Ok(user)
    }

    /// Takes `amount` out of escrow for payment elsewhere
    pub(crate) fn release(
        &self,
        tx: &mut Transaction<'_>,
        account: &Address,
        amount: &Asset,
    ) -> Result<UserAccount> {
        let mut user = self.user(tx, account)?;
        user.escrow = user.escrow.checked_sub(amount)?;
        tx.put(account_key(account, Role::User), &AccountRecord::User(user.clone()))?;
        Ok(user)
    }

    /// Stores the rating against the miner's record
    pub(crate) fn record_rating(
        &self,
        tx: &mut Transaction<'_>,
        miner: &Address,
        rating: Rating,
    ) -> Result<()> {
        let mut record = self.get(tx, miner, Role::Miner)?;
        if let AccountRecord::Miner(m) = &mut record {
            m.star = Some(rating);
            m.ratings = m.ratings.saturating_add(1);
        }
        tx.put(account_key(miner, Role::Miner), &record)?;
        Ok(())
    }
}
