use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use swingbot::config::{PlanOverrides, Settings};
use swingbot::exchange::{build_gateway, cancel_all, Credentials, ExchangeGateway, ExchangeKind};
use swingbot::execution::{shutdown_channel, Clock, Poller, TokioClock};
use swingbot::notify::{Notifier, TelegramSink, TradeEvent};
use swingbot::strategy::SwingTradeController;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swingbot")]
#[command(about = "Buy low, sell high: one limit-order round trip on a spot exchange")]
#[command(version)]
struct Cli {
    /// Settings file (default: ./swingbot.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Exchange to use: binance, binance-testnet or paper
    #[arg(long, global = true)]
    exchange: Option<String>,

    /// JSON secrets file keyed by exchange
    #[arg(long, global = true)]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the swing trade until both legs fill
    Trade {
        /// Market symbol, e.g. BTC/USDC
        #[arg(long)]
        symbol: Option<String>,

        /// Entry (buy) limit price
        #[arg(long)]
        entry: Option<f64>,

        /// Exit (sell) limit price
        #[arg(long)]
        exit: Option<f64>,

        /// Quote currency to spend on entry
        #[arg(long, conflicts_with = "amount")]
        notional: Option<f64>,

        /// Base currency amount to buy
        #[arg(long)]
        amount: Option<f64>,

        /// Seconds between polls
        #[arg(long)]
        interval: Option<f64>,

        /// Relative trigger tolerance, e.g. 0.05 for 5%
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Show account balances
    Balance,

    /// Show the last trade price
    Price {
        #[arg(long)]
        symbol: String,
    },

    /// List open orders
    OpenOrders,

    /// Cancel every open order
    CancelAll {
        /// Only cancel orders on this symbol
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    dotenvy::dotenv().ok();
    setup_logging();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let notifier = build_notifier(&settings);

    match run(cli, settings, notifier.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            notifier
                .emit(TradeEvent::Fatal {
                    message: format!("{:#}", e),
                })
                .await;
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swingbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(exchange) = &cli.exchange {
        settings.exchange.name = exchange.clone();
    }
    Ok(settings)
}

fn build_notifier(settings: &Settings) -> Notifier {
    let notifier = Notifier::new();
    match &settings.notify.telegram {
        Some(telegram) => notifier.with_sink(Arc::new(TelegramSink::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        ))),
        None => notifier,
    }
}

fn credentials(cli: &Cli, kind: ExchangeKind) -> Result<Option<Credentials>> {
    if !kind.needs_credentials() {
        return Ok(None);
    }
    if let Some(path) = &cli.secrets {
        let creds = Credentials::from_secrets_file(path, kind)
            .with_context(|| format!("Failed to read secrets from {}", path.display()))?;
        return Ok(Some(creds));
    }
    Ok(Credentials::from_env())
}

async fn run(cli: Cli, settings: Settings, notifier: Notifier) -> Result<()> {
    let kind: ExchangeKind = settings.exchange.name.parse()?;
    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
            trigger.trigger();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let poller = Poller::new(clock, shutdown);
    let gateway = build_gateway(&settings, credentials(&cli, kind)?, poller.clone())
        .context("Failed to set up exchange")?;

    match cli.command {
        Commands::Trade {
            symbol,
            entry,
            exit,
            notional,
            amount,
            interval,
            tolerance,
        } => {
            let overrides = PlanOverrides {
                symbol,
                entry_price: entry,
                exit_price: exit,
                notional,
                amount,
                poll_interval_secs: interval,
                tolerance,
            };
            let plan = settings.resolve_plan(&overrides).context("Invalid trade plan")?;

            tracing::info!("🚀 Swing trade starting on {}", kind);
            tracing::info!("  Symbol: {}", plan.symbol);
            tracing::info!("  Entry: {} | Exit: {}", plan.entry_price, plan.exit_price);
            tracing::info!(
                "  Poll: {:?} | Tolerance: {:.2}%",
                plan.poll_interval,
                plan.tolerance * 100.0
            );

            let mut controller = SwingTradeController::new(gateway, poller, notifier);
            let report = controller.run(&plan).await?;

            tracing::info!(
                resumed_from = report.resumed_from,
                entry_order_id = ?report.entry_order_id,
                exit_order_id = %report.exit_order_id,
                "✅ Round trip complete"
            );
        }
        Commands::Balance => print_balances(gateway.as_ref()).await?,
        Commands::Price { symbol } => {
            let price = gateway
                .last_price(&symbol)
                .await
                .with_context(|| format!("Failed to fetch price for {}", symbol))?;
            println!("{} {}", symbol, price);
        }
        Commands::OpenOrders => {
            let orders = gateway.open_orders().await.context("Failed to list open orders")?;
            if orders.is_empty() {
                println!("No open orders");
            }
            for order in orders {
                println!(
                    "{:<24} {:<10} {} {} @ {} [{}]",
                    order.id, order.symbol, order.side, order.amount, order.price, order.status
                );
            }
        }
        Commands::CancelAll { symbol } => {
            let canceled = cancel_all(gateway.as_ref(), symbol.as_deref())
                .await
                .context("Failed to cancel orders")?;
            println!("Canceled {} order(s)", canceled.len());
        }
    }

    Ok(())
}

async fn print_balances(gateway: &dyn ExchangeGateway) -> Result<()> {
    let balances = gateway.balances().await.context("Failed to fetch balances")?;
    let mut rows: Vec<_> = balances.into_iter().filter(|(_, v)| *v > 0.0).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    if rows.is_empty() {
        println!("No balances");
    }
    for (currency, amount) in rows {
        println!("{:<8} {}", currency, amount);
    }
    Ok(())
}
