use crate::types::Symbol;
use anyhow::{bail, Context};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// RocksDB directory
    pub db_path: PathBuf,
    /// Account allowed to register and fund
    pub admin: Address,
    /// Symbol every reward and balance is denominated in
    pub symbol: Symbol,
    /// Highest accepted confirmation rating
    pub rating_max: u8,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./dbs/market"),
            admin: Address::zero(),
            symbol: Symbol::default(),
            rating_max: 5,
            command_buffer: 10,
            event_buffer: 20,
        }
    }
}

impl MarketConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `DSE_DB_PATH`, `DSE_ADMIN`, `DSE_SYMBOL` and `DSE_RATING_MAX` take
    /// precedence over file values
    pub fn apply_env(mut self) -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("DSE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(admin) = std::env::var("DSE_ADMIN") {
            self.admin = admin
                .trim()
                .parse()
                .with_context(|| format!("DSE_ADMIN `{}` is not an address", admin))?;
        }
        if let Ok(symbol) = std::env::var("DSE_SYMBOL") {
            self.symbol = symbol.parse()?;
        }
        if let Ok(max) = std::env::var("DSE_RATING_MAX") {
            self.rating_max = max
                .trim()
                .parse()
                .with_context(|| format!("DSE_RATING_MAX `{}`", max))?;
        }
        Ok(self)
    }

    /// File (if given) then environment, then validation
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command_buffer == 0 || self.event_buffer == 0 {
            bail!("command_buffer and event_buffer must be non-zero");
        }
        Ok(())
    }
}
