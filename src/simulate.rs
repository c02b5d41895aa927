//! Simulation harness for noisy order flow against the engine.

use crate::exchange::Exchange;
use crate::orders::{OrderStatus, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, Normal};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use tracing::{info, warn};

const MARKET: &str = "BTCUSD";

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// How many submissions to fire.
    pub orders: u64,
    /// How many funded trading accounts take part.
    pub accounts: u64,
    /// Average order size (unit-exp * mean_qty).
    pub mean_qty: f64,
    /// N(0, σ) drift applied to mid each tick.
    pub noise_sigma: f64,
    /// Chance a tick cancels an open order instead of quoting.
    pub cancel_ratio: f64,
    /// Chance a quoting tick goes out as a market order.
    pub market_ratio: f64,
    /// RNG seed; the same seed replays the same flow.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            orders: 1000,
            accounts: 4,
            mean_qty: 3.0,
            noise_sigma: 0.5,
            cancel_ratio: 0.1,
            market_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Default, Serialize)]
pub struct SimReport {
    pub submitted: u64,
    pub rejected: u64,
    pub canceled: u64,
    pub trades: usize,
    pub last_price: Option<Decimal>,
}

/// Noisy order-flow simulation loop.
///
/// Registers a BTC/USD venue, funds `cfg.accounts` traders, then quotes
/// limit orders around a drifting mid-price with Exp-distributed sizes,
/// sprinkling in market orders and cancels. All flow goes straight through
/// the exchange's public operations, so every tick exercises the full
/// pre-check / lock / match / settle pipeline.
pub fn run_simulation(cfg: SimConfig) -> anyhow::Result<SimReport> {
    let mut exchange = Exchange::new();
    exchange.register_symbol("USD", 2)?;
    exchange.register_symbol("BTC", 2)?;
    exchange.register_market("BTC", "USD")?;

    let mut traders = Vec::new();
    for i in 0..cfg.accounts.max(2) {
        let id = exchange.register_account(&format!("trader-{i}"));
        exchange.deposit(id, "USD", Decimal::from(100_000))?;
        exchange.deposit(id, "BTC", Decimal::from(1_000))?;
        traders.push(id);
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let drift = Normal::new(0.0, cfg.noise_sigma).expect("noise_sigma >= 0");

    let mut report = SimReport::default();
    let mut mid: f64 = 50.0;

    // Choose your quoting spread here
    let spread = 1.0_f64;

    for tick in 0..cfg.orders {
        let account_id = traders[rng.random_range(0..traders.len())];

        if rng.random_bool(cfg.cancel_ratio) {
            let open = exchange.get_orders(account_id, MARKET, Some(OrderStatus::Open))?;
            if let Some(order) = open.first() {
                if exchange.cancel(account_id, MARKET, order.id).is_ok() {
                    report.canceled += 1;
                }
                continue;
            }
        }

        // mid drift, kept away from zero
        mid = (mid + drift.sample(&mut rng)).max(2.0);

        // size ~ Exp1 * mean_qty  (and round to >= 1)
        let unit: f64 = Exp1.sample(&mut rng);
        let qty = (unit * cfg.mean_qty).max(1.0).round();
        let quantity = Decimal::from_f64(qty).unwrap_or(Decimal::ONE);

        let (side, quote_price) = if rng.random_bool(0.5) {
            (Side::Buy, mid - spread)
        } else {
            (Side::Sell, mid + spread)
        };
        let price = if rng.random_bool(cfg.market_ratio) {
            None
        } else {
            Decimal::from_f64(quote_price.max(1.0))
        };

        let result = match side {
            Side::Buy => exchange.buy(account_id, MARKET, quantity, price),
            Side::Sell => exchange.sell(account_id, MARKET, quantity, price),
        };
        match result {
            Ok(order_id) => {
                report.submitted += 1;
                info!(
                    tick,
                    account_id,
                    order_id,
                    side = %side,
                    qty = %quantity,
                    mid = format_args!("{mid:.2}"),
                    "sim tick"
                );
            }
            Err(e) => {
                report.rejected += 1;
                warn!(tick, account_id, error = %e, "sim order rejected");
            }
        }
    }

    report.trades = exchange.get_trades(MARKET)?.len();
    report.last_price = exchange.market(MARKET).and_then(|m| m.last_price());

    // every unit deposited is still somewhere in a wallet
    for ticker in ["USD", "BTC"] {
        let mut total = Decimal::ZERO;
        for id in &traders {
            for entry in exchange.get_wallet(*id)? {
                if entry.symbol.as_str() == ticker {
                    total += entry.total;
                }
            }
        }
        info!(ticker, %total, "aggregate balance after run");
    }

    info!(
        submitted = report.submitted,
        rejected = report.rejected,
        canceled = report.canceled,
        trades = report.trades,
        "simulation done"
    );
    Ok(report)
}
