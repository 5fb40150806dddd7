use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use vpos_gateway::config::GatewayConfig;
use vpos_gateway::logging;
use vpos_gateway::payments::{Account, Bank, Order, PaymentResult, VirtualPos};

/// Query and manage orders on a bank virtual POS
#[derive(Debug, Parser)]
#[command(name = "vpos", version)]
struct Cli {
    /// Bank variant: est, garanti, inter, kuveyt, vakifbank, payfor
    #[arg(long, env = "VPOS_BANK")]
    bank: Bank,

    /// Gateway configuration file; endpoints come from the environment
    /// when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Current status of an order
    Status { order_id: String },
    /// Transaction history of an order
    History { order_id: String },
    /// Void an order on the same day
    Cancel {
        order_id: String,
        /// Bank reference of the original transaction
        #[arg(long)]
        ref_ret_num: Option<String>,
    },
    /// Refund part or all of an order
    Refund {
        order_id: String,
        amount: Decimal,
        #[arg(long)]
        ref_ret_num: Option<String>,
    },
}

fn order(id: &str, amount: Decimal, ref_ret_num: Option<String>) -> Result<Order> {
    let mut order = Order::new(id, amount)?;
    if let Some(ref_ret_num) = ref_ret_num {
        order = order.with_ref_ret_num(ref_ret_num);
    }
    Ok(order)
}

async fn run(pos: &VirtualPos, command: Command) -> Result<PaymentResult> {
    let result = match command {
        Command::Status { order_id } => pos.status(&order(&order_id, Decimal::ZERO, None)?).await?,
        Command::History { order_id } => {
            pos.history(&order(&order_id, Decimal::ZERO, None)?).await?
        }
        Command::Cancel {
            order_id,
            ref_ret_num,
        } => pos.cancel(&order(&order_id, Decimal::ZERO, ref_ret_num)?).await?,
        Command::Refund {
            order_id,
            amount,
            ref_ret_num,
        } => pos.refund(&order(&order_id, amount, ref_ret_num)?).await?,
    };
    Ok(result)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::from_env(cli.bank)?,
    };
    let account = Account::from_env(cli.bank)?;

    tracing::info!("Bank: {}", cli.bank);
    tracing::info!("API endpoint: {}", config.endpoints.api_url);
    tracing::info!("Test mode: {}", config.test_mode);

    let pos = VirtualPos::from_config(account, config)?;
    let result = run(&pos, cli.command).await?;

    let output = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
    println!("{}", output);

    Ok(())
}
