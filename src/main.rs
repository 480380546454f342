use clap::{Parser, Subcommand};
use dse_market::{
    Action, Market, MarketConfig, MarketError, MarketHandle, MarketService, Query, RocksStore,
    SignedAction, SystemClock, Wallet,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "dse-market", about = "Decentralized storage marketplace")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Read requests as JSON lines from stdin and answer on stdout
    Serve {
        /// Overrides the configured database directory
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Sign an action (JSON) and print the envelope
    Sign {
        /// Hex private key
        #[arg(long, env = "DSE_PRIVATE_KEY")]
        key: String,
        /// Action as JSON, e.g. '{"share":{"account":"0x..","content_hash":"h1"}}'
        action: String,
        /// The signer's next nonce, see the `nonce` query
        #[arg(long)]
        nonce: u64,
        /// Add a signature to this existing envelope instead
        #[arg(long)]
        cosign: bool,
    },
}

/// One stdin line
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Request {
    Submit(SignedAction),
    Query(Query),
}

async fn handle_line(handle: &MarketHandle, line: &str) -> serde_json::Value {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            return json!({"error": {"kind": "invalid_input", "message": e.to_string()}});
        }
    };
    let result = match request {
        Request::Submit(signed) => handle
            .submit(signed)
            .await
            .and_then(|r| serde_json::to_value(r).map_err(|e| MarketError::InvalidInput(e.to_string()))),
        Request::Query(query) => handle
            .query(query)
            .await
            .and_then(|r| serde_json::to_value(r).map_err(|e| MarketError::InvalidInput(e.to_string()))),
    };
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({"error": {"kind": e.kind(), "message": e.to_string()}}),
    }
}

async fn serve(mut config: MarketConfig, db: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(db) = db {
        config.db_path = db;
    }
    if config.admin.is_zero() {
        warn!("No admin configured: register and fund will always be rejected");
    }

    let store = Arc::new(RocksStore::open(&config.db_path)?);
    let market = Market::from_config(&config, store, Arc::new(SystemClock));
    let (service, handle) = MarketService::new(market, &config);
    let service_task = tokio::spawn(service.run());
    info!(
        "Market serving from {} in {}",
        config.db_path.display(),
        config.symbol
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let output = handle_line(&handle, &line).await;
        stdout.write_all(format!("{}\n", output).as_bytes()).await?;
        stdout.flush().await?;
    }

    drop(handle);
    service_task.await?;
    Ok(())
}

async fn sign(key: &str, input: &str, nonce: u64, cosign: bool) -> anyhow::Result<()> {
    let wallet = Wallet::from_private_key(key)?;
    let signed = if cosign {
        let mut signed: SignedAction = serde_json::from_str(input)?;
        wallet.cosign(&mut signed, nonce).await?;
        signed
    } else {
        let action: Action = serde_json::from_str(input)?;
        wallet.sign(action, nonce).await?
    };
    println!("{}", serde_json::to_string(&signed)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Cmd::Serve { db: None }) {
        Cmd::Serve { db } => match MarketConfig::load(cli.config.as_deref()) {
            Ok(config) => serve(config, db).await,
            Err(e) => Err(e),
        },
        Cmd::Sign {
            key,
            action,
            nonce,
            cosign,
        } => sign(&key, &action, nonce, cosign).await,
    };

    if let Err(e) = &result {
        error!("dse-market failed: {:#}", e);
    }
    result
}
