//! Storage orders: the marketplace's central state machine.
//!
//! ```text
//! upload ──► Open ──take──► Taken ──confirm──► Confirmed
//!             │
//!             └──cancel──► (order and file deleted)
//! ```
//!
//! The reward leaves the employer's balance into escrow at upload. Cancel
//! returns it, confirm pays it to the taker.

use crate::error::{MarketError, Result};
use crate::files::FileRegistry;
use crate::ledger::{Holder, Ledger};
use crate::registry::AccountRegistry;
use crate::storage::Transaction;
use crate::types::{Asset, FileRecord, OrderRecord, OrderStatus, Rating, Role};
use crate::wallet::Authority;
use ethers::types::Address;
use log::{error, info};
use std::sync::Arc;

const ORDER_SEQ_KEY: &[u8] = b"seq:order";
const ORDER_PREFIX: &[u8] = b"order:";

fn order_key(id: u64) -> Vec<u8> {
    format!("order:{:020}", id).into_bytes()
}

fn employer_index_key(employer: &Address, id: u64) -> Vec<u8> {
    format!("idx:order_employer:{:?}:{:020}", employer, id).into_bytes()
}

fn employer_index_scope(employer: &Address) -> Vec<u8> {
    format!("idx:order_employer:{:?}:", employer).into_bytes()
}

fn taker_index_key(taker: &Address, id: u64) -> Vec<u8> {
    format!("idx:order_taker:{:?}:{:020}", taker, id).into_bytes()
}

fn taker_index_scope(taker: &Address) -> Vec<u8> {
    format!("idx:order_taker:{:?}:", taker).into_bytes()
}

fn not_found(id: u64) -> MarketError {
    MarketError::NotFound(format!("order #{}", id))
}

/// Maps a missing file behind a live order to an invariant violation
fn file_missing(order: &OrderRecord, e: MarketError) -> MarketError {
    match e {
        MarketError::NotFound(_) => {
            error!(
                "(orders) order #{} references missing file #{} of {:?}",
                order.id, order.file_id, order.employer
            );
            MarketError::FileMissing {
                order_id: order.id,
                file_id: order.file_id,
                owner: order.employer,
            }
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct OrderBook {
    accounts: AccountRegistry,
    files: FileRegistry,
    ledger: Arc<dyn Ledger>,
    rating_max: u8,
}

impl OrderBook {
    pub fn new(
        accounts: AccountRegistry,
        files: FileRegistry,
        ledger: Arc<dyn Ledger>,
        rating_max: u8,
    ) -> Self {
        Self {
            accounts,
            files,
            ledger,
            rating_max,
        }
    }

    /// Creates the file and its open order together
    pub fn upload(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        user: Address,
        content_hash: String,
        reward: Asset,
        now: i64,
    ) -> Result<(OrderRecord, FileRecord)> {
        auth.require(&user)?;
        self.accounts.get(tx, &user, Role::User)?;
        self.accounts.ensure_symbol(&reward)?;
        if content_hash.is_empty() {
            return Err(MarketError::InvalidInput("empty content hash".into()));
        }
        self.ledger.lock(tx, &user, &reward)?;

        let file = self.files.create(tx, user, content_hash)?;
        let id = tx.next_id(ORDER_SEQ_KEY.to_vec())?;
        let order = OrderRecord {
            id,
            employer: user,
            time: now,
            reward,
            taker: None,
            file_id: file.id,
            status: OrderStatus::Open,
        };
        tx.put(order_key(id), &order)?;
        tx.put(employer_index_key(&user, id), &id)?;

        info!(
            "(orders) {:?} opened order #{} for file #{} with reward {}",
            user, id, file.id, order.reward
        );
        Ok((order, file))
    }

    /// Only the employer may cancel, and only while the order is open
    pub fn cancel(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        user: Address,
        order_id: u64,
    ) -> Result<(OrderRecord, FileRecord)> {
        auth.require(&user)?;

        let order = self.get(tx, order_id)?;
        if order.employer != user {
            return Err(MarketError::Unauthorized(order.employer));
        }
        if !order.is_open() {
            return Err(MarketError::AlreadyTaken(order_id));
        }

        tx.delete(order_key(order_id));
        tx.delete(employer_index_key(&order.employer, order_id));
        let file = self
            .files
            .remove(tx, &order.employer, order.file_id)
            .map_err(|e| file_missing(&order, e))?;
        self.ledger.unlock(tx, &order.employer, &order.reward)?;

        info!(
            "(orders) {:?} cancelled order #{} and file #{}",
            user, order_id, file.id
        );
        Ok((order, file))
    }

    /// Assigns the miner and hands its public key to the employer's file
    pub fn take(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        miner: Address,
        order_id: u64,
        pub_key: String,
    ) -> Result<(OrderRecord, FileRecord)> {
        auth.require(&miner)?;
        self.accounts.get(tx, &miner, Role::Miner)?;

        let mut order = self.get(tx, order_id)?;
        if !order.is_open() || !order.status.can_transition_to(&OrderStatus::Taken) {
            return Err(MarketError::AlreadyTaken(order_id));
        }

        order.taker = Some(miner);
        order.status = OrderStatus::Taken;
        tx.put(order_key(order_id), &order)?;
        tx.put(taker_index_key(&miner, order_id), &order_id)?;

        let file = self
            .files
            .attach_key(tx, &order.employer, order.file_id, pub_key)
            .map_err(|e| file_missing(&order, e))?;

        info!("(orders) {:?} took order #{}", miner, order_id);
        Ok((order, file))
    }

    /// Terminal success path: pays the taker and rates it
    pub fn confirm(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        user: Address,
        order_id: u64,
        star: u8,
    ) -> Result<OrderRecord> {
        auth.require(&user)?;

        let mut order = self.get(tx, order_id)?;
        if order.employer != user {
            return Err(MarketError::Unauthorized(order.employer));
        }
        let taker = order.taker.ok_or(MarketError::NotTaken(order_id))?;
        if order.status.is_terminal() || !order.status.can_transition_to(&OrderStatus::Confirmed) {
            return Err(MarketError::AlreadyConfirmed(order_id));
        }
        let rating = Rating::new(star, self.rating_max)?;

        self.ledger
            .settle(tx, &order.employer, &Holder::miner(taker), &order.reward)?;
        self.accounts.record_rating(tx, &taker, rating)?;

        order.status = OrderStatus::Confirmed;
        tx.put(order_key(order_id), &order)?;

        info!(
            "(orders) {:?} confirmed order #{}, paid {} to {:?} rated {}",
            user,
            order_id,
            order.reward,
            taker,
            rating.value()
        );
        Ok(order)
    }

    pub fn get(&self, tx: &Transaction<'_>, order_id: u64) -> Result<OrderRecord> {
        tx.get::<OrderRecord>(&order_key(order_id))?
            .ok_or_else(|| not_found(order_id))
    }

    pub fn all(&self, tx: &Transaction<'_>) -> Result<Vec<OrderRecord>> {
        Ok(tx.scan::<OrderRecord>(ORDER_PREFIX)?)
    }

    pub fn by_employer(&self, tx: &Transaction<'_>, employer: &Address) -> Result<Vec<OrderRecord>> {
        self.from_index(tx, &employer_index_scope(employer))
    }

    pub fn by_taker(&self, tx: &Transaction<'_>, taker: &Address) -> Result<Vec<OrderRecord>> {
        self.from_index(tx, &taker_index_scope(taker))
    }

    fn from_index(&self, tx: &Transaction<'_>, scope: &[u8]) -> Result<Vec<OrderRecord>> {
        tx.scan::<u64>(scope)?
            .into_iter()
            .map(|id| self.get(tx, id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountLedger;
    use crate::storage::MemoryStore;
    use crate::types::Symbol;

    struct Fixture {
        store: MemoryStore,
        orders: OrderBook,
        files: FileRegistry,
        ledger: Arc<AccountLedger>,
        user: Address,
        miner: Address,
    }

    fn fixture() -> Fixture {
        let admin = Address::repeat_byte(0xAD);
        let user = Address::repeat_byte(1);
        let miner = Address::repeat_byte(2);
        let accounts = AccountRegistry::new(admin, Symbol::default());
        let store = MemoryStore::new();

        let auth = Authority::from_signers([admin]);
        let mut tx = Transaction::new(&store);
        accounts.register(&mut tx, &auth, user, Role::User).unwrap();
        accounts.register(&mut tx, &auth, miner, Role::Miner).unwrap();
        accounts
            .fund(&mut tx, &auth, user, Role::User, &"2.0000 EOS".parse().unwrap())
            .unwrap();
        tx.commit().unwrap();

        let files = FileRegistry::new();
        let ledger = Arc::new(AccountLedger::new(accounts.clone()));
        Fixture {
            store,
            orders: OrderBook::new(accounts, files.clone(), ledger.clone(), 5),
            files,
            ledger,
            user,
            miner,
        }
    }

    fn reward() -> Asset {
        "1.0000 EOS".parse().unwrap()
    }

    #[test]
    fn test_upload_links_order_to_new_file() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let auth = Authority::from_signers([f.user]);

        let (order, file) = f
            .orders
            .upload(&mut tx, &auth, f.user, "h1".into(), reward(), 10)
            .unwrap();
        assert_eq!(order.file_id, file.id);
        assert_eq!(order.status, OrderStatus::Open);
        assert!(order.taker.is_none());
        assert_eq!(f.orders.by_employer(&tx, &f.user).unwrap(), vec![order]);
    }

    #[test]
    fn test_upload_escrows_reward_and_cancel_returns_it() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let auth = Authority::from_signers([f.user]);

        let (order, _) = f
            .orders
            .upload(&mut tx, &auth, f.user, "h1".into(), reward(), 0)
            .unwrap();
        assert_eq!(f.ledger.balance(&tx, &Holder::user(f.user)).unwrap().to_string(), "1.0000 EOS");
        assert_eq!(f.ledger.escrow(&tx, &f.user).unwrap(), reward());

        f.orders.cancel(&mut tx, &auth, f.user, order.id).unwrap();
        assert_eq!(f.ledger.balance(&tx, &Holder::user(f.user)).unwrap().to_string(), "2.0000 EOS");
        assert!(f.ledger.escrow(&tx, &f.user).unwrap().is_zero());
    }

    #[test]
    fn test_upload_beyond_balance_rejected() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let auth = Authority::from_signers([f.user]);

        f.orders
            .upload(&mut tx, &auth, f.user, "h1".into(), reward(), 0)
            .unwrap();
        f.orders
            .upload(&mut tx, &auth, f.user, "h2".into(), reward(), 0)
            .unwrap();
        assert!(matches!(
            f.orders.upload(&mut tx, &auth, f.user, "h3".into(), reward(), 0),
            Err(MarketError::InsufficientFunds { .. })
        ));
        assert_eq!(f.orders.all(&tx).unwrap().len(), 2);
    }

    #[test]
    fn test_take_attaches_key_in_employer_scope() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let (order, _) = f
            .orders
            .upload(&mut tx, &Authority::from_signers([f.user]), f.user, "h1".into(), reward(), 0)
            .unwrap();

        let miner_auth = Authority::from_signers([f.miner]);
        let (taken, file) = f
            .orders
            .take(&mut tx, &miner_auth, f.miner, order.id, "pubkeyABC".into())
            .unwrap();
        assert_eq!(taken.taker, Some(f.miner));
        assert_eq!(file.owner, f.user);
        assert_eq!(f.files.get(&tx, &f.user, file.id).unwrap().pub_key, "pubkeyABC");
        assert_eq!(f.orders.by_taker(&tx, &f.miner).unwrap().len(), 1);

        assert_eq!(
            f.orders.take(&mut tx, &miner_auth, f.miner, order.id, "other".into()),
            Err(MarketError::AlreadyTaken(order.id))
        );
    }

    #[test]
    fn test_take_with_missing_file_is_invariant_violation() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let (order, file) = f
            .orders
            .upload(&mut tx, &Authority::from_signers([f.user]), f.user, "h1".into(), reward(), 0)
            .unwrap();
        f.files.remove(&mut tx, &f.user, file.id).unwrap();

        let err = f
            .orders
            .take(&mut tx, &Authority::from_signers([f.miner]), f.miner, order.id, "k".into())
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::FileMissing {
                order_id: order.id,
                file_id: file.id,
                owner: f.user
            }
        );
    }

    #[test]
    fn test_cancel_only_by_employer() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let (order, _) = f
            .orders
            .upload(&mut tx, &Authority::from_signers([f.user]), f.user, "h1".into(), reward(), 0)
            .unwrap();

        let other = Address::repeat_byte(7);
        assert_eq!(
            f.orders
                .cancel(&mut tx, &Authority::from_signers([other]), other, order.id),
            Err(MarketError::Unauthorized(f.user))
        );
    }

    #[test]
    fn test_confirm_rejects_out_of_scale_rating() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let user_auth = Authority::from_signers([f.user]);
        let (order, _) = f
            .orders
            .upload(&mut tx, &user_auth, f.user, "h1".into(), reward(), 0)
            .unwrap();
        f.orders
            .take(&mut tx, &Authority::from_signers([f.miner]), f.miner, order.id, "k".into())
            .unwrap();

        assert_eq!(
            f.orders.confirm(&mut tx, &user_auth, f.user, order.id, 9),
            Err(MarketError::InvalidRating { value: 9, max: 5 })
        );
        let confirmed = f.orders.confirm(&mut tx, &user_auth, f.user, order.id, 4).unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert_eq!(
            f.orders.confirm(&mut tx, &user_auth, f.user, order.id, 4),
            Err(MarketError::AlreadyConfirmed(order.id))
        );
    }

    #[test]
    fn test_upload_rejects_foreign_symbol() {
        let f = fixture();
        let mut tx = Transaction::new(&f.store);
        let auth = Authority::from_signers([f.user]);
        assert!(matches!(
            f.orders
                .upload(&mut tx, &auth, f.user, "h1".into(), "1.00 SYS".parse().unwrap(), 0),
            Err(MarketError::SymbolMismatch { .. })
        ));
    }
}
