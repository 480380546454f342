use crate::error::{MarketError, Result};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest precision an asset may carry
pub const MAX_PRECISION: u8 = 18;

/// Registration role. Each role keeps its own record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Miner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Miner => "miner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token symbol, written `precision,CODE` (e.g. `4,EOS`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub code: String,
    pub precision: u8,
}

impl Symbol {
    pub fn new(code: impl Into<String>, precision: u8) -> Result<Self> {
        let code = code.into();
        if code.is_empty() || code.len() > 7 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(MarketError::InvalidInput(format!(
                "symbol code `{}` must be 1-7 uppercase letters",
                code
            )));
        }
        if precision > MAX_PRECISION {
            return Err(MarketError::InvalidInput(format!(
                "precision {} exceeds {}",
                precision, MAX_PRECISION
            )));
        }
        Ok(Self { code, precision })
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self {
            code: "EOS".to_string(),
            precision: 4,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.precision, self.code)
    }
}

impl FromStr for Symbol {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        let (precision, code) = s
            .split_once(',')
            .ok_or_else(|| MarketError::InvalidInput(format!("malformed symbol `{}`", s)))?;
        let precision = precision
            .trim()
            .parse::<u8>()
            .map_err(|e| MarketError::InvalidInput(format!("symbol precision: {}", e)))?;
        Symbol::new(code.trim(), precision)
    }
}

/// Amount of a token in base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: U256,
    pub symbol: Symbol,
}

impl Asset {
    pub fn new(amount: U256, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }

    pub fn zero(symbol: Symbol) -> Self {
        Self::new(U256::zero(), symbol)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    fn ensure_symbol(&self, other: &Asset) -> Result<()> {
        if self.symbol != other.symbol {
            return Err(MarketError::SymbolMismatch {
                expected: self.symbol.to_string(),
                actual: other.symbol.to_string(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Asset) -> Result<Asset> {
        self.ensure_symbol(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| MarketError::InvalidInput(format!("{} + {} overflows", self, other)))?;
        Ok(Asset::new(amount, self.symbol.clone()))
    }

    pub fn checked_sub(&self, other: &Asset) -> Result<Asset> {
        self.ensure_symbol(other)?;
        let amount =
            self.amount
                .checked_sub(other.amount)
                .ok_or_else(|| MarketError::InsufficientFunds {
                    required: other.to_string(),
                    available: self.to_string(),
                })?;
        Ok(Asset::new(amount, self.symbol.clone()))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.symbol.precision as usize;
        if precision == 0 {
            return write!(f, "{} {}", self.amount, self.symbol.code);
        }
        let scale = U256::from(10u64).pow(U256::from(precision));
        let (whole, frac) = self.amount.div_mod(scale);
        write!(
            f,
            "{}.{:0>width$} {}",
            whole,
            frac.to_string(),
            self.symbol.code,
            width = precision
        )
    }
}

impl FromStr for Asset {
    type Err = MarketError;

    /// Parses `"1.0000 EOS"`. The number of decimals sets the precision.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || MarketError::InvalidInput(format!("malformed asset `{}`", s));
        let (number, code) = s.trim().split_once(' ').ok_or_else(malformed)?;
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }
        let precision = u8::try_from(frac.len()).map_err(|_| malformed())?;
        let symbol = Symbol::new(code.trim(), precision)?;
        let amount = U256::from_dec_str(&format!("{}{}", whole, frac)).map_err(|_| malformed())?;
        Ok(Asset::new(amount, symbol))
    }
}

/// Bounded confirmation score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8, max: u8) -> Result<Self> {
        if value > max {
            return Err(MarketError::InvalidRating { value, max });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub account: Address,
    /// Spendable funds
    pub balance: Asset,
    /// Rewards locked behind open and taken orders
    pub escrow: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerAccount {
    pub account: Address,
    pub balance: Asset,
    /// Latest rating received on a confirmed order
    pub star: Option<Rating>,
    /// Number of ratings received so far
    pub ratings: u32,
}

/// Account record, tagged by role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRecord {
    User(UserAccount),
    Miner(MinerAccount),
}

impl AccountRecord {
    pub fn role(&self) -> Role {
        match self {
            AccountRecord::User(_) => Role::User,
            AccountRecord::Miner(_) => Role::Miner,
        }
    }

    pub fn account(&self) -> Address {
        match self {
            AccountRecord::User(u) => u.account,
            AccountRecord::Miner(m) => m.account,
        }
    }

    pub fn balance(&self) -> &Asset {
        match self {
            AccountRecord::User(u) => &u.balance,
            AccountRecord::Miner(m) => &m.balance,
        }
    }

    pub fn balance_mut(&mut self) -> &mut Asset {
        match self {
            AccountRecord::User(u) => &mut u.balance,
            AccountRecord::Miner(m) => &mut m.balance,
        }
    }
}

/// Delegation from a user to a miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    /// Unique within the user's scope only
    pub id: u64,
    pub user: Address,
    pub miner: Address,
    pub time: i64,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique within the owner's scope only
    pub id: u64,
    /// Hash of the encrypted content
    pub content_hash: String,
    pub owner: Address,
    /// Taker's public key, empty until the order is taken
    pub pub_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Taken,
    Confirmed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        use OrderStatus::*;
        matches!((self, next), (Open, Taken) | (Taken, Confirmed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: u64,
    pub employer: Address,
    pub time: i64,
    pub reward: Asset,
    /// Unset while the order is open
    pub taker: Option<Address>,
    /// File id in the employer's scope
    pub file_id: u64,
    pub status: OrderStatus,
}

impl OrderRecord {
    pub fn is_open(&self) -> bool {
        self.taker.is_none()
    }
}
