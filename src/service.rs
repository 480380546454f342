use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::market::{Market, Receipt};
use crate::types::{AccountRecord, FileRecord, OrderRecord, Role, TrustRecord};
use crate::wallet::SignedAction;
use ethers::types::Address;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Read-only lookups served by the market loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Next nonce the account must sign with
    Nonce { account: Address },
    Account { account: Address, role: Role },
    Order { order_id: u64 },
    Orders,
    OrdersByEmployer { employer: Address },
    OrdersByTaker { taker: Address },
    File { owner: Address, file_id: u64 },
    FilesByOwner { owner: Address },
    Trust { user: Address, id: u64 },
    TrustsByUser { user: Address },
    TrustsByMiner { miner: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResponse {
    Nonce(u64),
    Account(AccountRecord),
    Order(OrderRecord),
    Orders(Vec<OrderRecord>),
    File(FileRecord),
    Files(Vec<FileRecord>),
    Trust(TrustRecord),
    Trusts(Vec<TrustRecord>),
}

/// Broadcast after every committed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketEvent {
    /// Position in the commit order, starting at zero
    pub sequence: u64,
    pub action: String,
    pub receipt: Receipt,
}

#[derive(Debug)]
pub enum Command {
    Submit {
        action: SignedAction,
        sender: oneshot::Sender<Result<Receipt>>,
    },
    Query {
        query: Query,
        sender: oneshot::Sender<Result<QueryResponse>>,
    },
}

/// Owns the market and executes commands one at a time, in arrival order
pub struct MarketService {
    market: Market,
    command_receiver: mpsc::Receiver<Command>,
    event_sender: broadcast::Sender<MarketEvent>,
    sequence: u64,
}

impl MarketService {
    pub fn new(market: Market, config: &MarketConfig) -> (Self, MarketHandle) {
        let (command_sender, command_receiver) = mpsc::channel(config.command_buffer);
        let (event_sender, _) = broadcast::channel(config.event_buffer);

        let handle = MarketHandle {
            command_sender,
            event_sender: event_sender.clone(),
        };
        let service = Self {
            market,
            command_receiver,
            event_sender,
            sequence: 0,
        };
        (service, handle)
    }

    /// Runs until every handle is dropped
    pub async fn run(mut self) {
        while let Some(command) = self.command_receiver.recv().await {
            self.command_handler(command);
        }
        info!("(service) all handles dropped, stopping after {} commits", self.sequence);
    }

    fn command_handler(&mut self, command: Command) {
        match command {
            Command::Submit { action, sender } => {
                let name = action.action.name();
                let result = self.market.apply(&action);
                if let Ok(receipt) = &result {
                    emit_event(
                        &self.event_sender,
                        MarketEvent {
                            sequence: self.sequence,
                            action: name.to_string(),
                            receipt: receipt.clone(),
                        },
                    );
                    self.sequence += 1;
                }
                if sender.send(result).is_err() {
                    error!("(service) {} reply dropped: caller went away", name);
                }
            }
            Command::Query { query, sender } => {
                let result = self.query(query);
                if sender.send(result).is_err() {
                    error!("(service) query reply dropped: caller went away");
                }
            }
        }
    }

    fn query(&self, query: Query) -> Result<QueryResponse> {
        debug!("(service) query {:?}", query);
        let market = &self.market;
        Ok(match query {
            Query::Nonce { account } => QueryResponse::Nonce(market.nonce_of(&account)?),
            Query::Account { account, role } => QueryResponse::Account(market.account(&account, role)?),
            Query::Order { order_id } => QueryResponse::Order(market.order(order_id)?),
            Query::Orders => QueryResponse::Orders(market.orders()?),
            Query::OrdersByEmployer { employer } => {
                QueryResponse::Orders(market.orders_by_employer(&employer)?)
            }
            Query::OrdersByTaker { taker } => QueryResponse::Orders(market.orders_by_taker(&taker)?),
            Query::File { owner, file_id } => QueryResponse::File(market.file(&owner, file_id)?),
            Query::FilesByOwner { owner } => QueryResponse::Files(market.files_by_owner(&owner)?),
            Query::Trust { user, id } => QueryResponse::Trust(market.trust(&user, id)?),
            Query::TrustsByUser { user } => QueryResponse::Trusts(market.trusts_by_user(&user)?),
            Query::TrustsByMiner { miner } => QueryResponse::Trusts(market.trusts_by_miner(&miner)?),
        })
    }
}

fn emit_event(sender: &broadcast::Sender<MarketEvent>, event: MarketEvent) {
    if sender.send(event).is_err() {
        debug!("(service) no event subscribers");
    }
}

/// Cloneable client of a running [`MarketService`]
#[derive(Clone)]
pub struct MarketHandle {
    command_sender: mpsc::Sender<Command>,
    event_sender: broadcast::Sender<MarketEvent>,
}

impl MarketHandle {
    pub async fn submit(&self, action: SignedAction) -> Result<Receipt> {
        let (sender, receiver) = oneshot::channel();
        self.command_sender
            .send(Command::Submit { action, sender })
            .await
            .map_err(|e| MarketError::ServiceUnavailable(e.to_string()))?;
        receiver
            .await
            .map_err(|e| MarketError::ServiceUnavailable(e.to_string()))?
    }

    pub async fn query(&self, query: Query) -> Result<QueryResponse> {
        let (sender, receiver) = oneshot::channel();
        self.command_sender
            .send(Command::Query { query, sender })
            .await
            .map_err(|e| MarketError::ServiceUnavailable(e.to_string()))?;
        receiver
            .await
            .map_err(|e| MarketError::ServiceUnavailable(e.to_string()))?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.event_sender.subscribe()
    }
}
