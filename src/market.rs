use crate::action::Action;
use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::files::FileRegistry;
use crate::ledger::{AccountLedger, Ledger};
use crate::orders::OrderBook;
use crate::registry::AccountRegistry;
use crate::storage::{KvStore, Transaction};
use crate::trust::TrustLedger;
use crate::types::{AccountRecord, Asset, FileRecord, OrderRecord, Role, Symbol, TrustRecord};
use crate::wallet::{Authority, SignedAction};
use ethers::types::Address;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

fn nonce_key(account: &Address) -> Vec<u8> {
    format!("seq:nonce:{:?}", account).into_bytes()
}

/// Outcome of a committed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Receipt {
    Registered(AccountRecord),
    Funded {
        account: Address,
        role: Role,
        balance: Asset,
    },
    TrustProposed(TrustRecord),
    TrustAccepted(TrustRecord),
    TrustCancelled(TrustRecord),
    Uploaded {
        order: OrderRecord,
        file: FileRecord,
    },
    UploadCancelled {
        order: OrderRecord,
        file: FileRecord,
    },
    OrderTaken {
        order: OrderRecord,
        file: FileRecord,
    },
    Confirmed(OrderRecord),
    Shared {
        account: Address,
        content_hash: String,
    },
}

/// The marketplace: every table plus the collaborators the state machine
/// needs. Mutations take `&mut self`, so calls against one `Market` are
/// serialized and each runs in its own transaction.
pub struct Market {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    accounts: AccountRegistry,
    trusts: TrustLedger,
    files: FileRegistry,
    orders: OrderBook,
}

impl Market {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        admin: Address,
        symbol: Symbol,
        rating_max: u8,
    ) -> Self {
        let accounts = AccountRegistry::new(admin, symbol);
        let ledger = Arc::new(AccountLedger::new(accounts.clone()));
        Self::with_ledger(store, clock, accounts, ledger, rating_max)
    }

    pub fn with_ledger(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        accounts: AccountRegistry,
        ledger: Arc<dyn Ledger>,
        rating_max: u8,
    ) -> Self {
        let files = FileRegistry::new();
        Self {
            store,
            clock,
            trusts: TrustLedger::new(accounts.clone()),
            orders: OrderBook::new(accounts.clone(), files.clone(), ledger, rating_max),
            accounts,
            files,
        }
    }

    pub fn from_config(config: &MarketConfig, store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            store,
            clock,
            config.admin,
            config.symbol.clone(),
            config.rating_max,
        )
    }

    /// Verifies the envelope, then executes it
    pub fn apply(&mut self, signed: &SignedAction) -> Result<Receipt> {
        let auth = match signed.verify() {
            Ok(auth) => auth,
            Err(e) => {
                warn!("(market) {} rejected: {}", signed.action.name(), e);
                return Err(e);
            }
        };
        self.execute(&auth, &signed.action)
    }

    /// Runs one action to completion. Either every write it made is
    /// committed or none is, signer nonces included.
    fn execute(&mut self, auth: &Authority, action: &Action) -> Result<Receipt> {
        let now = self.clock.now();
        let mut tx = Transaction::new(self.store.as_ref());

        let outcome = Self::consume_nonces(&mut tx, auth)
            .and_then(|_| self.dispatch(&mut tx, auth, action.clone(), now));
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("(market) {} rejected: {}", action.name(), e);
                return Err(e);
            }
        };
        tx.commit()?;

        debug!("(market) {} committed", action.name());
        Ok(receipt)
    }

    /// Each signer's nonce must be the next one in its sequence
    fn consume_nonces(tx: &mut Transaction<'_>, auth: &Authority) -> Result<()> {
        for (account, nonce) in auth.nonces() {
            let expected = tx.next_id(nonce_key(account))?;
            if expected != *nonce {
                return Err(MarketError::Replayed {
                    account: *account,
                    expected,
                    actual: *nonce,
                });
            }
        }
        Ok(())
    }

    fn dispatch(
        &self,
        tx: &mut Transaction<'_>,
        auth: &Authority,
        action: Action,
        now: i64,
    ) -> Result<Receipt> {
        match action {
            Action::Register { account, role } => self
                .accounts
                .register(tx, auth, account, role)
                .map(Receipt::Registered),
            Action::Fund {
                account,
                role,
                amount,
            } => {
                let balance = self.accounts.fund(tx, auth, account, role, &amount)?;
                Ok(Receipt::Funded {
                    account,
                    role,
                    balance,
                })
            }
            Action::ProposeTrust { user, miner } => self
                .trusts
                .propose(tx, auth, user, miner, now)
                .map(Receipt::TrustProposed),
            Action::AcceptTrust { miner, id, user } => self
                .trusts
                .accept(tx, auth, miner, id, user)
                .map(Receipt::TrustAccepted),
            Action::CancelTrust { user, id } => self
                .trusts
                .cancel(tx, auth, user, id)
                .map(Receipt::TrustCancelled),
            Action::Upload {
                user,
                content_hash,
                reward,
            } => {
                let (order, file) = self
                    .orders
                    .upload(tx, auth, user, content_hash, reward, now)?;
                Ok(Receipt::Uploaded { order, file })
            }
            Action::CancelUpload { user, order_id } => {
                let (order, file) = self.orders.cancel(tx, auth, user, order_id)?;
                Ok(Receipt::UploadCancelled { order, file })
            }
            Action::TakeOrder {
                miner,
                order_id,
                pub_key,
            } => {
                let (order, file) = self.orders.take(tx, auth, miner, order_id, pub_key)?;
                Ok(Receipt::OrderTaken { order, file })
            }
            Action::Confirm {
                user,
                order_id,
                star,
            } => self
                .orders
                .confirm(tx, auth, user, order_id, star)
                .map(Receipt::Confirmed),
            Action::Share {
                account,
                content_hash,
            } => {
                auth.require(&account)?;
                info!("(market) {:?} shared {}", account, content_hash);
                Ok(Receipt::Shared {
                    account,
                    content_hash,
                })
            }
        }
    }

    fn reader(&self) -> Transaction<'_> {
        Transaction::new(self.store.as_ref())
    }

    pub fn admin(&self) -> Address {
        self.accounts.admin()
    }

    pub fn symbol(&self) -> &Symbol {
        self.accounts.symbol()
    }

    /// Next nonce `account` must sign with
    pub fn nonce_of(&self, account: &Address) -> Result<u64> {
        Ok(self.reader().get::<u64>(&nonce_key(account))?.unwrap_or(0))
    }

    pub fn account(&self, account: &Address, role: Role) -> Result<AccountRecord> {
        self.accounts.get(&self.reader(), account, role)
    }

    pub fn balance_of(&self, account: &Address, role: Role) -> Result<Asset> {
        self.accounts.balance_of(&self.reader(), account, role)
    }

    pub fn order(&self, order_id: u64) -> Result<OrderRecord> {
        self.orders.get(&self.reader(), order_id)
    }

    pub fn orders(&self) -> Result<Vec<OrderRecord>> {
        self.orders.all(&self.reader())
    }

    pub fn orders_by_employer(&self, employer: &Address) -> Result<Vec<OrderRecord>> {
        self.orders.by_employer(&self.reader(), employer)
    }

    pub fn orders_by_taker(&self, taker: &Address) -> Result<Vec<OrderRecord>> {
        self.orders.by_taker(&self.reader(), taker)
    }

    pub fn file(&self, owner: &Address, file_id: u64) -> Result<FileRecord> {
        self.files.get(&self.reader(), owner, file_id)
    }

    pub fn files_by_owner(&self, owner: &Address) -> Result<Vec<FileRecord>> {
        self.files.by_owner(&self.reader(), owner)
    }

    pub fn trust(&self, user: &Address, id: u64) -> Result<TrustRecord> {
        self.trusts.get(&self.reader(), user, id)
    }

    pub fn trusts_by_user(&self, user: &Address) -> Result<Vec<TrustRecord>> {
        self.trusts.by_user(&self.reader(), user)
    }

    pub fn trusts_by_miner(&self, miner: &Address) -> Result<Vec<TrustRecord>> {
        self.trusts.by_miner(&self.reader(), miner)
    }
}
