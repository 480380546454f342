use crate::types::Role;
use ethers::types::Address;
use serde::Serialize;
use thiserror::Error;

/// Marketplace error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Required signer missing from the envelope
    #[error("missing authority of {0:?}")]
    Unauthorized(Address),

    /// Signature could not be produced or recovered
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Envelope nonce does not match the signer's next expected nonce
    #[error("stale nonce {actual} from {account:?}, expected {expected}")]
    Replayed {
        account: Address,
        expected: u64,
        actual: u64,
    },

    #[error("{role} {account:?} already registered")]
    AlreadyRegistered { account: Address, role: Role },

    #[error("{role} {account:?} is not registered")]
    NotRegistered { account: Address, role: Role },

    /// Referenced id absent in the expected scope
    #[error("{0} not found")]
    NotFound(String),

    #[error("order #{0} already taken")]
    AlreadyTaken(u64),

    #[error("order #{0} not taken")]
    NotTaken(u64),

    #[error("order #{0} already confirmed")]
    AlreadyConfirmed(u64),

    /// A live order points at a file that is gone
    #[error("file #{file_id} of order #{order_id} is missing from {owner:?}")]
    FileMissing {
        order_id: u64,
        file_id: u64,
        owner: Address,
    },

    #[error("invalid rating {value}, expected 0..={max}")]
    InvalidRating { value: u8, max: u8 },

    #[error("symbol mismatch: expected {expected}, got {actual}")]
    SymbolMismatch { expected: String, actual: String },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("market service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Coarse classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    NotFound,
    InvalidState,
    InvariantViolation,
    InvalidInput,
    Internal,
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        use MarketError::*;
        match self {
            Unauthorized(_) | InvalidSignature(_) | Replayed { .. } => ErrorKind::Authorization,
            NotRegistered { .. } | NotFound(_) => ErrorKind::NotFound,
            AlreadyRegistered { .. } | AlreadyTaken(_) | NotTaken(_) | AlreadyConfirmed(_) => {
                ErrorKind::InvalidState
            }
            FileMissing { .. } => ErrorKind::InvariantViolation,
            InvalidRating { .. }
            | SymbolMismatch { .. }
            | InsufficientFunds { .. }
            | InvalidInput(_) => ErrorKind::InvalidInput,
            Storage(_) | ServiceUnavailable(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for MarketError {
    fn from(e: anyhow::Error) -> Self {
        MarketError::Storage(format!("{:#}", e))
    }
}

impl From<bincode::Error> for MarketError {
    fn from(e: bincode::Error) -> Self {
        MarketError::Storage(e.to_string())
    }
}

/// Result type for marketplace operations
pub type Result<T> = std::result::Result<T, MarketError>;
