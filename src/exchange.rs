use crate::asset::{Asset, quantize};
use crate::errors::{ExchangeError, ExchangeResult};
use crate::instrument::{Pair, Symbol};
use crate::market::Market;
use crate::orderbook::{BookSnapshot, Level};
use crate::orders::{OrderStatus, OrderType, Side};
use crate::trade::Tick;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Open and closed order ids an account holds on one market.
#[derive(Debug, Default, Clone)]
pub struct AccountOrders {
    pub open: Vec<u64>,
    pub closed: Vec<u64>,
}

/// A participant: one wallet slot per listed symbol and one order ledger per
/// registered market.
///
/// Slots are materialised when the account is registered; symbols or markets
/// listed afterwards do not appear in existing accounts — setup completes
/// before the venue opens for business.
#[derive(Debug)]
pub struct Account {
    pub id: u64,
    pub name: String,
    pub wallet: HashMap<Symbol, Asset>,
    orders: HashMap<String, AccountOrders>,
}

impl Account {
    /// This account's open/closed order ids on `market`.
    pub fn orders(&self, market: &str) -> Option<&AccountOrders> {
        self.orders.get(&market.to_ascii_uppercase())
    }
}

/// A single submission in wire form: a cancel when `order_id` is present,
/// otherwise a buy or sell dispatched on `side`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub account_id: u64,
    pub market: String,
    pub side: Option<Side>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub order_id: Option<u64>,
}

/// Positive acknowledgment of a processed quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteAck {
    /// A new order was accepted under this id.
    Order(u64),
    /// The referenced order was canceled.
    Canceled(u64),
}

/// One row of an account's order history on a market.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub id: u64,
    pub time: u64,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Initial quantity, not the remaining one.
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
}

/// One row of an account's wallet view.
#[derive(Debug, Clone, Serialize)]
pub struct WalletEntry {
    pub symbol: Symbol,
    pub total: Decimal,
    pub unlocked: Decimal,
}

/// The venue: listed symbols, markets, accounts and the ledger discipline
/// binding them.
///
/// Every mutating operation is an atomic unit. The pre-checks are read-only;
/// locking funds is the commit point; the remaining steps (matching,
/// settlement, order-list bookkeeping) then run unconditionally. A failed
/// operation returns its reason and mutates nothing.
#[derive(Debug, Default)]
pub struct Exchange {
    symbols: Vec<Symbol>,
    unit_decimals: HashMap<Symbol, u32>,
    markets: BTreeMap<String, Market>,
    accounts: BTreeMap<u64, Account>,
    next_account_id: u64,
}

/// Single choke point for negative acknowledgments.
fn reject<T>(op: &'static str, err: ExchangeError) -> ExchangeResult<T> {
    warn!(op, %err, "operation rejected");
    Err(err)
}

// The ledger's balance moves. Each call touches one bucket at a time and the
// lock/settle discipline keeps every bucket non-negative.
fn lock(asset: &mut Asset, amount: Decimal) {
    asset.set_unlocked(asset.unlocked() - amount);
    asset.set_locked(asset.locked() + amount);
}

fn unlock(asset: &mut Asset, amount: Decimal) {
    asset.set_locked(asset.locked() - amount);
    asset.set_unlocked(asset.unlocked() + amount);
}

fn debit_locked(asset: &mut Asset, amount: Decimal) {
    asset.set_locked(asset.locked() - amount);
}

fn credit_unlocked(asset: &mut Asset, amount: Decimal) {
    asset.set_unlocked(asset.unlocked() + amount);
}

/// Quote-currency cost of locking a buy before it enters the matcher.
///
/// Walks a snapshot of the asks depth, best level first, consuming aggregate
/// per-level volume. With a limit price the remainder rests at that price as
/// soon as the limit no longer beats the level; without one the asks must
/// cover the whole quantity, else the order is unfillable (`None`). The walk
/// only reads depth totals; it never touches the queues themselves.
fn buy_cost(market: &Market, quantity: Decimal, price: Option<Decimal>) -> Option<Decimal> {
    let mut cost = Decimal::ZERO;
    let mut remaining = quantity;
    match price {
        Some(limit) => {
            for (ask_price, ask_volume) in market.orderbook.asks.depths() {
                if limit <= ask_price {
                    cost += remaining * limit;
                    return Some(cost);
                }
                if remaining <= ask_volume {
                    cost += remaining * ask_price;
                    return Some(cost);
                }
                cost += ask_volume * ask_price;
                remaining -= ask_volume;
            }
            // asks drained; the rest goes on the book at the limit price
            cost += remaining * limit;
            Some(cost)
        }
        None => {
            for (ask_price, ask_volume) in market.orderbook.asks.depths() {
                if remaining <= ask_volume {
                    cost += remaining * ask_price;
                    return Some(cost);
                }
                cost += ask_volume * ask_price;
                remaining -= ask_volume;
            }
            None
        }
    }
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn account(&self, id: u64) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn market(&self, key: &str) -> Option<&Market> {
        self.markets.get(&key.to_ascii_uppercase())
    }

    fn decimals(&self, symbol: &Symbol) -> u32 {
        self.unit_decimals.get(symbol).copied().unwrap_or(0)
    }

    fn lookup_symbol(&self, ticker: &str) -> ExchangeResult<Symbol> {
        let symbol: Symbol = ticker.parse().map_err(ExchangeError::InvalidSymbol)?;
        if !self.unit_decimals.contains_key(&symbol) {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        Ok(symbol)
    }

    /// List `ticker` with the given quantisation. Must precede any market or
    /// account that uses the symbol.
    pub fn register_symbol(&mut self, ticker: &str, unit_decimals: u32) -> ExchangeResult<()> {
        let symbol: Symbol = match ticker.parse() {
            Ok(symbol) => symbol,
            Err(e) => return reject("register_symbol", ExchangeError::InvalidSymbol(e)),
        };
        if self.unit_decimals.contains_key(&symbol) {
            return reject(
                "register_symbol",
                ExchangeError::DuplicateSymbol(symbol.to_string()),
            );
        }
        info!(%symbol, unit_decimals, "symbol registered");
        self.unit_decimals.insert(symbol.clone(), unit_decimals);
        self.symbols.push(symbol);
        Ok(())
    }

    /// Open a market for `base`/`quote`; both symbols must already be listed.
    pub fn register_market(&mut self, base: &str, quote: &str) -> ExchangeResult<()> {
        let base = match self.lookup_symbol(base) {
            Ok(symbol) => symbol,
            Err(e) => return reject("register_market", e),
        };
        let quote = match self.lookup_symbol(quote) {
            Ok(symbol) => symbol,
            Err(e) => return reject("register_market", e),
        };
        let pair = Pair { base, quote };
        let key = pair.symbol();
        if self.markets.contains_key(&key) {
            return reject("register_market", ExchangeError::DuplicateMarket(key));
        }
        info!(market = %key, "market registered");
        self.markets.insert(key, Market::new(pair));
        Ok(())
    }

    /// Create an account with a zero balance for every listed symbol and an
    /// empty order ledger for every registered market.
    pub fn register_account(&mut self, name: &str) -> u64 {
        let id = self.next_account_id;
        self.next_account_id += 1;
        let wallet = self
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), Asset::new()))
            .collect();
        let orders = self
            .markets
            .keys()
            .map(|key| (key.clone(), AccountOrders::default()))
            .collect();
        self.accounts.insert(
            id,
            Account {
                id,
                name: name.to_string(),
                wallet,
                orders,
            },
        );
        info!(account_id = id, name, "account registered");
        id
    }

    pub fn deposit(&mut self, account_id: u64, symbol: &str, quantity: Decimal) -> ExchangeResult<()> {
        self.try_deposit(account_id, symbol, quantity)
            .inspect_err(|e| warn!(account_id, symbol, %e, "deposit rejected"))
    }

    fn try_deposit(&mut self, account_id: u64, ticker: &str, quantity: Decimal) -> ExchangeResult<()> {
        let symbol = self.lookup_symbol(ticker)?;
        let quantity = quantize(quantity, self.decimals(&symbol));
        if quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity);
        }
        let Some(account) = self.accounts.get_mut(&account_id) else {
            return Err(ExchangeError::UnknownAccount(account_id));
        };
        let Some(asset) = account.wallet.get_mut(&symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        credit_unlocked(asset, quantity);
        info!(account_id, %symbol, %quantity, "deposit accepted");
        Ok(())
    }

    pub fn withdraw(&mut self, account_id: u64, symbol: &str, quantity: Decimal) -> ExchangeResult<()> {
        self.try_withdraw(account_id, symbol, quantity)
            .inspect_err(|e| warn!(account_id, symbol, %e, "withdraw rejected"))
    }

    fn try_withdraw(&mut self, account_id: u64, ticker: &str, quantity: Decimal) -> ExchangeResult<()> {
        let symbol = self.lookup_symbol(ticker)?;
        let quantity = quantize(quantity, self.decimals(&symbol));
        if quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity);
        }
        let Some(account) = self.accounts.get_mut(&account_id) else {
            return Err(ExchangeError::UnknownAccount(account_id));
        };
        let Some(asset) = account.wallet.get_mut(&symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        let available = asset.unlocked();
        if available < quantity {
            return Err(ExchangeError::InsufficientBalance {
                symbol: symbol.to_string(),
                required: quantity,
                available,
            });
        }
        asset.set_unlocked(available - quantity);
        info!(account_id, %symbol, %quantity, "withdraw accepted");
        Ok(())
    }

    /// Submit a buy order: limit when `price` is given, market otherwise.
    /// Returns the id assigned to the order.
    pub fn buy(
        &mut self,
        account_id: u64,
        market: &str,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> ExchangeResult<u64> {
        self.try_submit(account_id, market, Side::Buy, quantity, price)
            .inspect_err(|e| warn!(account_id, market, side = %Side::Buy, %e, "order rejected"))
    }

    /// Submit a sell order: limit when `price` is given, market otherwise.
    /// Returns the id assigned to the order.
    pub fn sell(
        &mut self,
        account_id: u64,
        market: &str,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> ExchangeResult<u64> {
        self.try_submit(account_id, market, Side::Sell, quantity, price)
            .inspect_err(|e| warn!(account_id, market, side = %Side::Sell, %e, "order rejected"))
    }

    fn try_submit(
        &mut self,
        account_id: u64,
        market_key: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> ExchangeResult<u64> {
        let key = market_key.to_ascii_uppercase();
        if !self.accounts.contains_key(&account_id) {
            return Err(ExchangeError::UnknownAccount(account_id));
        }
        let Some(market) = self.markets.get(&key) else {
            return Err(ExchangeError::UnknownMarket(key));
        };
        let base = market.pair.base.clone();
        let quote = market.pair.quote.clone();

        let quantity = quantize(quantity, self.decimals(&base));
        let price = price.map(|p| quantize(p, self.decimals(&quote)));
        if quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity);
        }
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(ExchangeError::InvalidPrice);
            }
        }

        // What the submitter must lock: the quote cost of a buy (priced
        // against the current asks), or the base quantity of a sell.
        let (lock_symbol, lock_amount) = match side {
            Side::Buy => match buy_cost(market, quantity, price) {
                Some(cost) => (quote.clone(), cost),
                None => return Err(ExchangeError::InsufficientLiquidity),
            },
            Side::Sell => {
                if price.is_none() && quantity > market.orderbook.bids.volume() {
                    return Err(ExchangeError::InsufficientLiquidity);
                }
                (base.clone(), quantity)
            }
        };

        {
            let Some(account) = self.accounts.get(&account_id) else {
                return Err(ExchangeError::UnknownAccount(account_id));
            };
            let Some(asset) = account.wallet.get(&lock_symbol) else {
                return Err(ExchangeError::UnknownSymbol(lock_symbol.to_string()));
            };
            let available = asset.unlocked();
            if available < lock_amount {
                return Err(ExchangeError::InsufficientBalance {
                    symbol: lock_symbol.to_string(),
                    required: lock_amount,
                    available,
                });
            }
        }

        // Commit point. Every lookup below was validated above, and the
        // steps from here on run unconditionally.
        let Some(market) = self.markets.get_mut(&key) else {
            return Err(ExchangeError::UnknownMarket(key));
        };
        if let Some(asset) = self
            .accounts
            .get_mut(&account_id)
            .and_then(|account| account.wallet.get_mut(&lock_symbol))
        {
            lock(asset, lock_amount);
        }

        let order_id = market.admit_order(account_id, side, quantity, price);
        if let Some(lists) = self
            .accounts
            .get_mut(&account_id)
            .and_then(|account| account.orders.get_mut(&key))
        {
            lists.open.push(order_id);
        }

        let (trade_ids, filled) = market.process_order(order_id);

        // Copy the scalars out of the registries before settling so the
        // borrow on the market can end.
        let settlements: Vec<(Side, Decimal, Decimal, u64, u64)> = trade_ids
            .iter()
            .filter_map(|id| market.trade(*id))
            .map(|t| (t.side, t.quantity, t.price, t.maker, t.taker))
            .collect();
        let closures: Vec<(u64, u64)> = filled
            .iter()
            .filter_map(|id| market.order(*id).map(|o| (o.owner, *id)))
            .collect();

        for (maker_side, traded, trade_price, maker, taker) in settlements {
            self.settle(&base, &quote, maker_side, traded, trade_price, maker, taker);
        }
        for (owner, order) in closures {
            self.close_order(owner, &key, order);
        }

        info!(account_id, market = %key, order = order_id, side = %side, "order executed");
        Ok(order_id)
    }

    /// Move one trade's value between maker and taker.
    ///
    /// The maker's side fixes the direction: a resting seller gives base out
    /// of `locked` and receives quote into `unlocked`; a resting buyer the
    /// reverse. The taker always mirrors the maker.
    fn settle(
        &mut self,
        base: &Symbol,
        quote: &Symbol,
        maker_side: Side,
        quantity: Decimal,
        price: Decimal,
        maker: u64,
        taker: u64,
    ) {
        let base_flow = quantity;
        let quote_flow = quantity * price;
        match maker_side {
            Side::Sell => {
                self.settle_leg(maker, base, base_flow, quote, quote_flow);
                self.settle_leg(taker, quote, quote_flow, base, base_flow);
            }
            Side::Buy => {
                self.settle_leg(maker, quote, quote_flow, base, base_flow);
                self.settle_leg(taker, base, base_flow, quote, quote_flow);
            }
        }
    }

    /// One side of a settlement: debit the given amount from the locked
    /// bucket, credit the received amount to the unlocked bucket.
    fn settle_leg(
        &mut self,
        account_id: u64,
        give: &Symbol,
        give_amount: Decimal,
        get: &Symbol,
        get_amount: Decimal,
    ) {
        let Some(account) = self.accounts.get_mut(&account_id) else {
            return;
        };
        if let Some(asset) = account.wallet.get_mut(give) {
            debit_locked(asset, give_amount);
        }
        if let Some(asset) = account.wallet.get_mut(get) {
            credit_unlocked(asset, get_amount);
        }
    }

    fn close_order(&mut self, owner: u64, market_key: &str, order_id: u64) {
        if let Some(lists) = self
            .accounts
            .get_mut(&owner)
            .and_then(|account| account.orders.get_mut(market_key))
        {
            lists.open.retain(|id| *id != order_id);
            lists.closed.push(order_id);
        }
    }

    /// Cancel a resting order owned by `account_id`, unlocking the funds
    /// still backing its remaining quantity.
    pub fn cancel(&mut self, account_id: u64, market: &str, order_id: u64) -> ExchangeResult<()> {
        self.try_cancel(account_id, market, order_id)
            .inspect_err(|e| warn!(account_id, market, order_id, %e, "cancel rejected"))
    }

    fn try_cancel(&mut self, account_id: u64, market_key: &str, order_id: u64) -> ExchangeResult<()> {
        let key = market_key.to_ascii_uppercase();
        if !self.accounts.contains_key(&account_id) {
            return Err(ExchangeError::UnknownAccount(account_id));
        }
        let Some(market) = self.markets.get_mut(&key) else {
            return Err(ExchangeError::UnknownMarket(key));
        };
        match market.order(order_id) {
            Some(order) if order.owner == account_id && order.status == OrderStatus::Open => {}
            _ => return Err(ExchangeError::OrderNotCancellable(order_id)),
        }
        let base = market.pair.base.clone();
        let quote = market.pair.quote.clone();
        let Some((side, remaining, price)) = market.cancel_order(order_id) else {
            return Err(ExchangeError::OrderNotCancellable(order_id));
        };

        // Only the residual is still locked; consumed portions were already
        // settled trade by trade.
        if let Some(account) = self.accounts.get_mut(&account_id) {
            match side {
                Side::Buy => {
                    // a resting buy is always a limit order, so it has a price
                    let residual = remaining * price.unwrap_or_default();
                    if let Some(asset) = account.wallet.get_mut(&quote) {
                        unlock(asset, residual);
                    }
                }
                Side::Sell => {
                    if let Some(asset) = account.wallet.get_mut(&base) {
                        unlock(asset, remaining);
                    }
                }
            }
        }
        self.close_order(account_id, &key, order_id);
        info!(account_id, market = %key, order_id, "order canceled");
        Ok(())
    }

    /// Dispatch a wire-form submission: cancel when `order_id` is present,
    /// otherwise buy/sell on `side`.
    pub fn process_quote(&mut self, quote: &QuoteRequest) -> ExchangeResult<QuoteAck> {
        if let Some(order_id) = quote.order_id {
            self.cancel(quote.account_id, &quote.market, order_id)?;
            return Ok(QuoteAck::Canceled(order_id));
        }
        let Some(quantity) = quote.quantity else {
            return reject("process_quote", ExchangeError::MalformedQuote);
        };
        match quote.side {
            Some(Side::Buy) => self
                .buy(quote.account_id, &quote.market, quantity, quote.price)
                .map(QuoteAck::Order),
            Some(Side::Sell) => self
                .sell(quote.account_id, &quote.market, quantity, quote.price)
                .map(QuoteAck::Order),
            None => reject("process_quote", ExchangeError::MalformedQuote),
        }
    }

    /// Aggregated depth per price level, best to worst on both sides.
    pub fn get_orderbook(&self, market: &str) -> ExchangeResult<BookSnapshot> {
        let key = market.to_ascii_uppercase();
        let Some(market) = self.markets.get(&key) else {
            return reject("get_orderbook", ExchangeError::UnknownMarket(key));
        };
        let level = |(price, volume)| Level { price, volume };
        Ok(BookSnapshot {
            market: key,
            bids: market.orderbook.bids.depths().map(level).collect(),
            asks: market.orderbook.asks.depths().map(level).collect(),
        })
    }

    /// The market's chronological trade tape.
    pub fn get_trades(&self, market: &str) -> ExchangeResult<&[Tick]> {
        let key = market.to_ascii_uppercase();
        let Some(market) = self.markets.get(&key) else {
            return reject("get_trades", ExchangeError::UnknownMarket(key));
        };
        Ok(market.trades_history())
    }

    /// The account's order history on a market, newest first, optionally
    /// filtered by status.
    pub fn get_orders(
        &self,
        account_id: u64,
        market: &str,
        status: Option<OrderStatus>,
    ) -> ExchangeResult<Vec<OrderRecord>> {
        let key = market.to_ascii_uppercase();
        let Some(account) = self.accounts.get(&account_id) else {
            return reject("get_orders", ExchangeError::UnknownAccount(account_id));
        };
        let Some(market) = self.markets.get(&key) else {
            return reject("get_orders", ExchangeError::UnknownMarket(key));
        };
        let mut records: Vec<OrderRecord> = account
            .orders
            .get(&key)
            .map(|lists| {
                lists
                    .open
                    .iter()
                    .chain(lists.closed.iter())
                    .filter_map(|id| market.order(*id))
                    .map(|order| OrderRecord {
                        id: order.id,
                        time: order.time,
                        side: order.side,
                        order_type: order.order_type(),
                        quantity: order.initial_quantity,
                        price: order.price,
                        status: order.status,
                    })
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(status) = status {
            records.retain(|record| record.status == status);
        }
        Ok(records)
    }

    /// Total and spendable balance per listed symbol.
    pub fn get_wallet(&self, account_id: u64) -> ExchangeResult<Vec<WalletEntry>> {
        let Some(account) = self.accounts.get(&account_id) else {
            return reject("get_wallet", ExchangeError::UnknownAccount(account_id));
        };
        let mut entries: Vec<WalletEntry> = account
            .wallet
            .iter()
            .map(|(symbol, asset)| WalletEntry {
                symbol: symbol.clone(),
                total: asset.total(),
                unlocked: asset.unlocked(),
            })
            .collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(entries)
    }
}
