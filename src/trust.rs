use crate::error::{MarketError, Result};
use crate::registry::AccountRegistry;
use crate::storage::Transaction;
use crate::types::{Role, TrustRecord};
use crate::wallet::Authority;
use ethers::types::Address;
use log::info;

fn trust_key(user: &Address, id: u64) -> Vec<u8> {
    format!("trust:{:?}:{:020}", user, id).into_bytes()
}

fn trust_scope(user: &Address) -> Vec<u8> {
    format!("trust:{:?}:", user).into_bytes()
}

fn trust_seq_key(user: &Address) -> Vec<u8> {
    format!("seq:trust:{:?}", user).into_bytes()
}

fn miner_index_key(miner: &Address, user: &Address, id: u64) -> Vec<u8> {
    format!("idx:trust_miner:{:?}:{:?}:{:020}", miner, user, id).into_bytes()
}

fn miner_index_scope(miner: &Address) -> Vec<u8> {
    format!("idx:trust_miner:{:?}:", miner).into_bytes()
}

fn not_found(user: &Address, id: u64) -> MarketError {
    MarketError::NotFound(format!("trust #{} of {:?}", id, user))
}

/// Delegations from users to miners.
///
/// Records live in the proposing user's scope. The named miner is the only
/// account that may flip the acceptance flag.
#[derive(Debug, Clone)]
pub struct TrustLedger {
    accounts: AccountRegistry,
}

impl TrustLedger {
    pub fn new(accounts: AccountRegistry) -> Self {
        Self { accounts }
    }

    pub fn propose(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        user: Address,
        miner: Address,
        now: i64,
    ) -> Result<TrustRecord> {
        auth.require(&user)?;
        self.accounts.get(tx, &user, Role::User)?;
        self.accounts.get(tx, &miner, Role::Miner)?;

        let id = tx.next_id(trust_seq_key(&user))?;
        let record = TrustRecord {
            id,
            user,
            miner,
            time: now,
            accepted: false,
        };
        tx.put(trust_key(&user, id), &record)?;
        tx.put(miner_index_key(&miner, &user, id), &(user, id))?;

        info!("(trust) {:?} proposed trust #{} in {:?}", user, id, miner);
        Ok(record)
    }

    /// Idempotent for the named miner
    pub fn accept(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        miner: Address,
        id: u64,
        user: Address,
    ) -> Result<TrustRecord> {
        auth.require(&miner)?;

        let key = trust_key(&user, id);
        let mut record = tx
            .get::<TrustRecord>(&key)?
            .ok_or_else(|| not_found(&user, id))?;
        if record.miner != miner {
            return Err(MarketError::Unauthorized(record.miner));
        }
        if record.accepted {
            return Ok(record);
        }

        record.accepted = true;
        tx.put(key, &record)?;

        info!("(trust) {:?} accepted trust #{} from {:?}", miner, id, user);
        Ok(record)
    }

    /// Removes the record whether or not it was accepted
    pub fn cancel(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        user: Address,
        id: u64,
    ) -> Result<TrustRecord> {
        auth.require(&user)?;

        let key = trust_key(&user, id);
        let record = tx
            .get::<TrustRecord>(&key)?
            .ok_or_else(|| not_found(&user, id))?;
        tx.delete(key);
        tx.delete(miner_index_key(&record.miner, &user, id));

        info!("(trust) {:?} cancelled trust #{}", user, id);
        Ok(record)
    }

    pub fn get(&self, tx: &Transaction<'_>, user: &Address, id: u64) -> Result<TrustRecord> {
        tx.get::<TrustRecord>(&trust_key(user, id))?
            .ok_or_else(|| not_found(user, id))
    }

    pub fn by_user(&self, tx: &Transaction<'_>, user: &Address) -> Result<Vec<TrustRecord>> {
        Ok(tx.scan::<TrustRecord>(&trust_scope(user))?)
    }

    pub fn by_miner(&self, tx: &Transaction<'_>, miner: &Address) -> Result<Vec<TrustRecord>> {
        let refs = tx.scan::<(Address, u64)>(&miner_index_scope(miner))?;
        refs.into_iter()
            .map(|(user, id)| self.get(tx, &user, id))
            .collect()
    }
}
