use crate::action::Action;
use crate::error::{MarketError, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// One account's consent: its signature over the action and its nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub nonce: u64,
    pub signature: Signature,
}

/// An action together with the signatures authorizing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAction {
    pub action: Action,
    /// One endorsement per consenting account
    pub signatures: Vec<Endorsement>,
}

impl SignedAction {
    pub fn unsigned(action: Action) -> Self {
        Self {
            action,
            signatures: Vec::new(),
        }
    }

    /// Recovers every signer with the nonce it signed. A malformed
    /// signature rejects the whole envelope rather than being skipped.
    pub fn verify(&self) -> Result<Authority> {
        let mut authority = Authority::default();
        for endorsement in &self.signatures {
            let payload = self.action.signing_payload(endorsement.nonce)?;
            let signer = endorsement
                .signature
                .recover(payload)
                .map_err(|e| MarketError::InvalidSignature(e.to_string()))?;
            if authority.nonces.insert(signer, endorsement.nonce).is_some() {
                return Err(MarketError::InvalidSignature(format!(
                    "{:?} signed more than once",
                    signer
                )));
            }
            authority.signers.insert(signer);
        }
        debug!(
            "(wallet) {} envelope carries {} signer(s)",
            self.action.name(),
            authority.signers.len()
        );
        Ok(authority)
    }
}

/// Accounts proven to consent to the action being executed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authority {
    signers: HashSet<Address>,
    /// Nonce each signer committed to. Empty for authorities built in-process.
    nonces: BTreeMap<Address, u64>,
}

impl Authority {
    pub fn from_signers<I: IntoIterator<Item = Address>>(signers: I) -> Self {
        Self {
            signers: signers.into_iter().collect(),
            nonces: BTreeMap::new(),
        }
    }

    /// Fails unless `account` signed
    pub fn require(&self, account: &Address) -> Result<()> {
        if self.signers.contains(account) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(*account))
        }
    }

    pub fn has(&self, account: &Address) -> bool {
        self.signers.contains(account)
    }

    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.signers.iter()
    }

    pub fn nonces(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.nonces.iter()
    }
}

/// Signs actions on behalf of one account
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: LocalWallet,
}

impl Wallet {
    pub fn new(signer: LocalWallet) -> Self {
        Self { signer }
    }

    /// Hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> Result<Self> {
        let signer = LocalWallet::from_str(key)
            .map_err(|e| MarketError::InvalidInput(format!("private key: {}", e)))?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// `nonce` must be this account's next unused nonce in the market
    pub async fn sign(&self, action: Action, nonce: u64) -> Result<SignedAction> {
        let mut signed = SignedAction::unsigned(action);
        self.cosign(&mut signed, nonce).await?;
        Ok(signed)
    }

    /// Adds this wallet's endorsement to an existing envelope
    pub async fn cosign(&self, signed: &mut SignedAction, nonce: u64) -> Result<()> {
        let payload = signed.action.signing_payload(nonce)?;
        let signature = self
            .signer
            .sign_message(payload)
            .await
            .map_err(|e| MarketError::InvalidSignature(e.to_string()))?;
        signed.signatures.push(Endorsement { nonce, signature });
        Ok(())
    }
}
