//! tzops - command line front-end for tezos-ops
//!
//! - `head`: print the current head
//! - `estimate-transfer`: dry-run a transfer and print fee, gas and storage
//! - `confirm <hash>`: wait for an operation injected elsewhere
//! - `watch`: stream new heads or operations matching a JSON filter

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tezos_ops::operations::params::TransferParams;
use tezos_ops::signer::PublicKeySigner;
use tezos_ops::subscribe::Filter;
use tezos_ops::{Config, TezosClient, TezosRpc, Unit};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "tzops", author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tzops.toml")]
    config: String,

    /// Node URL, overrides the configuration
    #[arg(long, env = "TEZOS_RPC_URL")]
    rpc_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print level and hash of the current head
    Head,

    /// Simulate a transfer and print the estimate
    EstimateTransfer {
        /// Sending account
        #[arg(long)]
        from: String,

        /// Public key of the sending account (used if it is not revealed yet)
        #[arg(long)]
        public_key: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: Decimal,

        /// tz, mtz or mutez
        #[arg(long, default_value = "tz")]
        unit: Unit,
    },

    /// Wait until an operation reaches the given depth
    Confirm {
        hash: String,

        #[arg(long)]
        confirmations: Option<u32>,

        #[arg(long)]
        interval_secs: Option<u64>,

        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print new heads, or operations matching a filter, as JSON lines
    Watch {
        /// e.g. '{"and":[{"kind":"transaction"},{"destination":"KT1..."}]}'
        #[arg(long)]
        filter: Option<String>,

        /// Exit after this many events
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let LoadedConfig {
        mut config,
        used_defaults,
    } = load_config(&args.config)?;
    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
    }
    config.validate().context("Invalid configuration")?;

    init_logging(args.verbose, args.json_logs || config.logging.json, &config.logging.level)?;
    report_config_source(&args.config, used_defaults);
    info!(version = env!("CARGO_PKG_VERSION"), rpc = %config.rpc.url, "tzops starting");

    let client = TezosClient::from_config(&config).context("Failed to create RPC client")?;

    let outcome = match args.command {
        Command::Head => head(&client).await,
        Command::EstimateTransfer {
            from,
            public_key,
            to,
            amount,
            unit,
        } => estimate_transfer(&client, from, public_key, to, amount, unit).await,
        Command::Confirm {
            hash,
            confirmations,
            interval_secs,
            timeout_secs,
        } => {
            confirm(
                &client,
                &hash,
                confirmations,
                interval_secs.map(Duration::from_secs),
                timeout_secs.map(Duration::from_secs),
            )
            .await
        }
        Command::Watch { filter, limit } => watch(&client, filter.as_deref(), limit).await,
    };

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }
    outcome
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool, level: &str) -> Result<()> {
    let default_filter = if verbose {
        "tzops=debug,tezos_ops=debug,info".to_string()
    } else {
        format!("tzops={level},tezos_ops={level},warn")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

struct LoadedConfig {
    config: Config,
    /// The file was missing; reported once logging is up
    used_defaults: bool,
}

/// Must run after `init_logging`
fn report_config_source(path: &str, used_defaults: bool) {
    if used_defaults {
        warn!("Config file '{}' not found, using defaults", path);
    }
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<LoadedConfig> {
    if std::path::Path::new(path).exists() {
        let config = Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        Ok(LoadedConfig {
            config,
            used_defaults: false,
        })
    } else {
        let config = Config::from_env().context("Failed to load config from environment")?;
        Ok(LoadedConfig {
            config,
            used_defaults: true,
        })
    }
}

async fn head(client: &TezosClient) -> Result<()> {
    let ctx = client.context().snapshot();
    let block = ctx.rpc().get_block().await.context("Failed to fetch head")?;
    println!(
        "{}",
        json!({ "level": block.level(), "hash": block.hash, "protocol": block.protocol })
    );
    Ok(())
}

async fn estimate_transfer(
    client: &TezosClient,
    from: String,
    public_key: String,
    to: String,
    amount: Decimal,
    unit: Unit,
) -> Result<()> {
    client.set_signer(Arc::new(PublicKeySigner::new(from.clone(), public_key)));
    let params = TransferParams::new(to, amount).with_unit(unit).with_source(from);
    let estimate = client
        .estimate()
        .transfer(&params)
        .await
        .context("Estimation failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "gas_limit": estimate.gas_limit(),
            "storage_limit": estimate.storage_limit(),
            "op_size": estimate.op_size(),
            "minimal_fee_mutez": estimate.minimal_fee_mutez(),
            "suggested_fee_mutez": estimate.suggested_fee_mutez(),
            "burn_fee_mutez": estimate.burn_fee_mutez(),
            "total_cost_mutez": estimate.total_cost_mutez(),
        }))?
    );
    Ok(())
}

async fn confirm(
    client: &TezosClient,
    hash: &str,
    confirmations: Option<u32>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
) -> Result<()> {
    let op = client.operation(hash);
    let head = op
        .confirmation(confirmations, interval, timeout)
        .await
        .with_context(|| format!("Operation {} not confirmed", hash))?;
    println!(
        "{}",
        json!({ "hash": hash, "included_in": op.included_in_level(), "confirmed_at": head })
    );
    Ok(())
}

async fn watch(client: &TezosClient, filter: Option<&str>, limit: Option<usize>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();

    // Keep the subscription alive for the whole loop
    let _subscription: Box<dyn std::any::Any> = match filter {
        Some(raw) => {
            let filter: Filter = serde_json::from_str(raw).context("Invalid filter JSON")?;
            let sub = client.subscribe().subscribe_operation(filter);
            sub.on_data(move |event| {
                let _ = tx.send(json!(event));
            });
            sub.on_error(|e| warn!(error = %e, "Poll failed"));
            Box::new(sub)
        }
        None => {
            let sub = client.subscribe().subscribe_head();
            sub.on_data(move |hash| {
                let _ = tx.send(json!({ "head": hash }));
            });
            sub.on_error(|e| warn!(error = %e, "Poll failed"));
            Box::new(sub)
        }
    };

    let mut seen = 0usize;
    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                println!("{}", event);
                seen += 1;
                if limit.is_some_and(|l| seen >= l) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
    info!(events = seen, "Watch finished");
    Ok(())
}
