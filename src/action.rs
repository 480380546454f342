use crate::error::Result;
use crate::types::{Asset, Role};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Prefix mixed into every signed payload so signatures cannot be
/// replayed as plain messages elsewhere
pub const SIGNING_DOMAIN: &[u8] = b"dse-market/action/v1";

/// Every state-changing call the marketplace accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Admin registers an account under a role
    Register { account: Address, role: Role },
    /// Admin credits an account with assets entering the market
    Fund {
        account: Address,
        role: Role,
        amount: Asset,
    },
    ProposeTrust { user: Address, miner: Address },
    AcceptTrust {
        miner: Address,
        id: u64,
        user: Address,
    },
    CancelTrust { user: Address, id: u64 },
    Upload {
        user: Address,
        content_hash: String,
        reward: Asset,
    },
    CancelUpload { user: Address, order_id: u64 },
    TakeOrder {
        miner: Address,
        order_id: u64,
        pub_key: String,
    },
    Confirm {
        user: Address,
        order_id: u64,
        star: u8,
    },
    Share {
        account: Address,
        content_hash: String,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Register { .. } => "register",
            Action::Fund { .. } => "fund",
            Action::ProposeTrust { .. } => "propose_trust",
            Action::AcceptTrust { .. } => "accept_trust",
            Action::CancelTrust { .. } => "cancel_trust",
            Action::Upload { .. } => "upload",
            Action::CancelUpload { .. } => "cancel_upload",
            Action::TakeOrder { .. } => "take_order",
            Action::Confirm { .. } => "confirm",
            Action::Share { .. } => "share",
        }
    }

    /// Bytes a signer commits to. The signer's nonce is part of them, so a
    /// signature authorizes exactly one execution.
    pub fn signing_payload(&self, nonce: u64) -> Result<Vec<u8>> {
        let mut payload = SIGNING_DOMAIN.to_vec();
        payload.extend_from_slice(&nonce.to_le_bytes());
        payload.extend(bincode::serialize(self)?);
        Ok(payload)
    }
}
