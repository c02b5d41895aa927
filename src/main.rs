use clap::{Parser, Subcommand};
use exchange_engine::exchange::Exchange;
use exchange_engine::simulate::{SimConfig, run_simulation};
use rust_decimal::Decimal;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "exchange-cli")]
#[command(version = "0.1", about = "A demo of an in-memory spot-exchange engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted two-trader session and print the resulting views
    Demo,
    /// Fire random order flow at a BTC/USD market
    Simulate {
        /// Number of submissions
        #[arg(default_value_t = 1000)]
        orders: u64,
        /// Number of funded accounts
        #[arg(default_value_t = 4)]
        accounts: u64,
        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn run_demo() -> anyhow::Result<()> {
    let mut exchange = Exchange::new();
    exchange.register_symbol("USD", 2)?;
    exchange.register_symbol("BTC", 2)?;
    exchange.register_market("BTC", "USD")?;

    let alice = exchange.register_account("alice");
    let bob = exchange.register_account("bob");
    exchange.deposit(alice, "USD", Decimal::from(1000))?;
    exchange.deposit(bob, "BTC", Decimal::from(2))?;

    // Bob rests an ask, Alice lifts part of it at market
    let ask = exchange.sell(bob, "BTCUSD", Decimal::from(2), Some(Decimal::from(100)))?;
    tracing::info!(order = ask, "resting ask placed");
    exchange.buy(alice, "BTCUSD", Decimal::from(1), None)?;

    println!(
        "book: {}",
        serde_json::to_string_pretty(&exchange.get_orderbook("BTCUSD")?)?
    );
    println!(
        "tape: {}",
        serde_json::to_string_pretty(&exchange.get_trades("BTCUSD")?)?
    );
    for (name, id) in [("alice", alice), ("bob", bob)] {
        println!(
            "{name}: {}",
            serde_json::to_string_pretty(&exchange.get_wallet(id)?)?
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Setup tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo => run_demo()?,
        Commands::Simulate {
            orders,
            accounts,
            seed,
        } => {
            let report = run_simulation(SimConfig {
                orders,
                accounts,
                seed,
                ..SimConfig::default()
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
