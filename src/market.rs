use crate::instrument::Pair;
use crate::orderbook::OrderBook;
use crate::orders::{Order, OrderStatus, Side};
use crate::trade::{Tick, Trade};
use crate::utils::now_ns;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

/// Per-pair state: the order book plus the canonical order and trade
/// registries and the trade tape.
///
/// `orders` keeps every order the market has ever seen, whatever its final
/// status; the book only references ids of resting OPEN orders. Order and
/// trade ids are assigned sequentially per market.
#[derive(Debug)]
pub struct Market {
    pub pair: Pair,
    pub orderbook: OrderBook,
    orders: HashMap<u64, Order>,
    trades: HashMap<u64, Trade>,
    trades_history: Vec<Tick>,
    next_order_id: u64,
    next_trade_id: u64,
}

impl Market {
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            orderbook: OrderBook::new(),
            orders: HashMap::new(),
            trades: HashMap::new(),
            trades_history: Vec::new(),
            next_order_id: 0,
            next_trade_id: 0,
        }
    }

    /// The market key, e.g. `BTCUSD`.
    pub fn symbol(&self) -> String {
        self.pair.symbol()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.orderbook.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.orderbook.asks.best_price()
    }

    /// Price of the most recent trade, if any.
    pub fn last_price(&self) -> Option<Decimal> {
        self.trades_history.last().map(|tick| tick.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn order(&self, id: u64) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn trade(&self, id: u64) -> Option<&Trade> {
        self.trades.get(&id)
    }

    /// Chronological tape of `{time, price, quantity}` executions.
    pub fn trades_history(&self) -> &[Tick] {
        &self.trades_history
    }

    /// Register a new OPEN order under a fresh id. The order is not matched
    /// yet; that is [`Market::process_order`]'s job.
    pub fn admit_order(
        &mut self,
        owner: u64,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        self.orders.insert(
            id,
            Order {
                id,
                time: now_ns(),
                owner,
                side,
                quantity,
                initial_quantity: quantity,
                price,
                status: OrderStatus::Open,
                trades: Vec::new(),
            },
        );
        id
    }

    /// Matches an admitted order against the opposite side of the book,
    /// returning the ids of the trades it produced and of every order that
    /// reached FILLED (makers and, possibly, the order itself).
    ///
    /// Matching walks the opposite tree best price first and the level queue
    /// front first, so fills honour price-time priority; every trade executes
    /// at the resting maker's price. The loop supports **partial fills**: the
    /// fill quantity is `min(incoming.quantity, resting.quantity)`, so neither
    /// order can overfill, and a partially consumed maker keeps its place at
    /// the head of its level.
    pub fn process_order(&mut self, order_id: u64) -> (Vec<u64>, Vec<u64>) {
        let mut trade_ids = Vec::new();
        let mut filled = Vec::new();

        loop {
            let Some(taker) = self.orders.get(&order_id) else {
                break;
            };
            let (taker_side, taker_price, taker_remaining, taker_owner) =
                (taker.side, taker.price, taker.quantity, taker.owner);

            let top = match taker_side {
                Side::Buy => self.orderbook.asks.top(),
                Side::Sell => self.orderbook.bids.top(),
            };
            let maker = top.and_then(|id| {
                self.orders.get(&id).and_then(|maker| {
                    maker
                        .price
                        .map(|price| (id, price, maker.quantity, maker.side, maker.owner))
                })
            });

            let crossed = match (&maker, taker_price) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some((_, maker_price, ..)), Some(limit)) => match taker_side {
                    Side::Buy => limit >= *maker_price,
                    Side::Sell => limit <= *maker_price,
                },
            };

            if !crossed {
                // A limit order that cannot trade rests on its own side. A
                // market order only reaches an empty opposite book if the
                // exchange's liquidity pre-check was skipped.
                if taker_price.is_some() {
                    if let Some(taker) = self.orders.get(&order_id) {
                        match taker_side {
                            Side::Buy => self.orderbook.bids.push(taker),
                            Side::Sell => self.orderbook.asks.push(taker),
                        }
                    }
                }
                break;
            }
            let Some((maker_id, maker_price, maker_quantity, maker_side, maker_owner)) = maker
            else {
                break;
            };

            // Trade at the maker's resting price.
            let amount = maker_quantity.min(taker_remaining);
            let time = now_ns();
            let trade_id = self.next_trade_id;
            self.next_trade_id += 1;
            info!(
                market = %self.pair,
                trade = trade_id,
                price = %maker_price,
                quantity = %amount,
                maker = maker_owner,
                taker = taker_owner,
                "trade executed"
            );
            self.trades.insert(
                trade_id,
                Trade {
                    id: trade_id,
                    time,
                    side: maker_side,
                    quantity: amount,
                    price: maker_price,
                    maker: maker_owner,
                    taker: taker_owner,
                },
            );
            self.trades_history.push(Tick {
                time,
                price: maker_price,
                quantity: amount,
            });
            trade_ids.push(trade_id);

            let mut maker_done = false;
            if let Some(maker) = self.orders.get_mut(&maker_id) {
                maker.quantity -= amount;
                maker.trades.push(trade_id);
                maker_done = maker.quantity == Decimal::ZERO;
            }
            let mut taker_done = false;
            if let Some(taker) = self.orders.get_mut(&order_id) {
                taker.quantity -= amount;
                taker.trades.push(trade_id);
                taker_done = taker.quantity == Decimal::ZERO;
            }

            // The traded amount leaves the level depth in place; only a
            // fully consumed maker is popped off its queue.
            let opposite = match taker_side {
                Side::Buy => &mut self.orderbook.asks,
                Side::Sell => &mut self.orderbook.bids,
            };
            opposite.reduce(maker_price, amount);
            if maker_done {
                if let Some(maker) = self.orders.get(&maker_id) {
                    opposite.pop(maker);
                }
                if let Some(maker) = self.orders.get_mut(&maker_id) {
                    maker.status = OrderStatus::Filled;
                }
                filled.push(maker_id);
            }
            if taker_done {
                if let Some(taker) = self.orders.get_mut(&order_id) {
                    taker.status = OrderStatus::Filled;
                }
                filled.push(order_id);
                break;
            }
        }

        (trade_ids, filled)
    }

    /// Pop a resting OPEN order off its tree and mark it CANCELED, returning
    /// its side, remaining quantity and price so the ledger can unlock the
    /// residual. The caller has already validated ownership.
    pub fn cancel_order(&mut self, order_id: u64) -> Option<(Side, Decimal, Option<Decimal>)> {
        let order = self.orders.get(&order_id)?;
        if order.status != OrderStatus::Open {
            return None;
        }
        match order.side {
            Side::Buy => self.orderbook.bids.pop(order),
            Side::Sell => self.orderbook.asks.pop(order),
        }
        let unlocked = (order.side, order.quantity, order.price);
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.status = OrderStatus::Canceled;
        }
        Some(unlocked)
    }
}
