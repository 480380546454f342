//! # dse-market
//!
//! Marketplace core for decentralized file storage. Users upload encrypted
//! files together with a reward. Miners take the resulting orders and are paid
//! once the uploader confirms delivery. Users may also delegate trust to a
//! miner, which only takes effect once that miner accepts.
//!
//! ## Layout
//!
//! - [`registry`]: User and Miner accounts with their balances and escrow
//! - [`trust`]: delegation requests from users to miners
//! - [`files`]: file records scoped by owner
//! - [`orders`]: the order state machine (upload, cancel, take, confirm)
//! - [`market`]: ties the above to storage, clock and ledger; one transaction per action
//! - [`service`]: tokio loop serializing signed actions from many callers
//!
//! Every mutating action arrives as a [`SignedAction`]. The signer set recovered
//! from it is the only source of authority. Each signature covers the signer's
//! next nonce, so an envelope executes at most once.

pub mod action;
pub mod clock;
pub mod config;
pub mod error;
pub mod files;
pub mod ledger;
pub mod market;
pub mod orders;
pub mod registry;
pub mod service;
pub mod storage;
pub mod trust;
pub mod types;
pub mod wallet;

pub use action::Action;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MarketConfig;
pub use error::{ErrorKind, MarketError, Result};
pub use ledger::{AccountLedger, Holder, Ledger};
pub use market::{Market, Receipt};
pub use service::{MarketEvent, MarketHandle, MarketService, Query, QueryResponse};
pub use storage::{KvStore, MemoryStore, RocksStore, Transaction, WriteOp};
pub use types::{
    AccountRecord, Asset, FileRecord, MinerAccount, OrderRecord, OrderStatus, Rating, Role,
    Symbol, TrustRecord, UserAccount,
};
pub use wallet::{Authority, Endorsement, SignedAction, Wallet};
