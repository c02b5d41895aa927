use exchange_engine::errors::ExchangeError;
use exchange_engine::exchange::{Exchange, QuoteAck, QuoteRequest};
use exchange_engine::instrument::Symbol;
use exchange_engine::orders::OrderStatus;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn sym(s: &str) -> Symbol {
    s.parse().unwrap()
}

/// A venue with USD/BTC listed at two decimals and one BTCUSD market.
fn venue() -> Exchange {
    let mut exchange = Exchange::new();
    exchange.register_symbol("USD", 2).unwrap();
    exchange.register_symbol("BTC", 2).unwrap();
    exchange.register_market("BTC", "USD").unwrap();
    exchange
}

fn funded(exchange: &mut Exchange, name: &str, usd: &str, btc: &str) -> u64 {
    let id = exchange.register_account(name);
    if usd != "0" {
        exchange.deposit(id, "USD", d(usd)).unwrap();
    }
    if btc != "0" {
        exchange.deposit(id, "BTC", d(btc)).unwrap();
    }
    id
}

fn unlocked(exchange: &Exchange, account: u64, ticker: &str) -> Decimal {
    exchange.account(account).unwrap().wallet[&sym(ticker)].unlocked()
}

fn locked(exchange: &Exchange, account: u64, ticker: &str) -> Decimal {
    exchange.account(account).unwrap().wallet[&sym(ticker)].locked()
}

fn total(exchange: &Exchange, account: u64, ticker: &str) -> Decimal {
    exchange.account(account).unwrap().wallet[&sym(ticker)].total()
}

/// Sum of a symbol's holdings across accounts; buys, sells and cancels must
/// never change it.
fn supply(exchange: &Exchange, accounts: &[u64], ticker: &str) -> Decimal {
    accounts.iter().map(|id| total(exchange, *id, ticker)).sum()
}

/// Book-level invariants: no crossed book, volume equals the sum of depths.
fn assert_book_invariants(exchange: &Exchange) {
    let market = exchange.market("BTCUSD").unwrap();
    if let (Some(bid), Some(ask)) = (market.best_bid(), market.best_ask()) {
        assert!(bid < ask, "book crossed: best bid {bid} >= best ask {ask}");
    }
    for tree in [&market.orderbook.bids, &market.orderbook.asks] {
        let depth_sum: Decimal = tree.depths().map(|(_, depth)| depth).sum();
        assert_eq!(tree.volume(), depth_sum);
    }
}

#[test]
fn rest_then_cross_settles_both_wallets() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "1");

    exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    exchange.buy(alice, "BTCUSD", d("1"), Some(d("100"))).unwrap();

    let tape = exchange.get_trades("BTCUSD").unwrap();
    assert_eq!(tape.len(), 1);
    assert_eq!(tape[0].price, d("100"));
    assert_eq!(tape[0].quantity, d("1"));

    assert_eq!(total(&exchange, alice, "BTC"), d("1"));
    assert_eq!(total(&exchange, alice, "USD"), d("900"));
    assert_eq!(total(&exchange, bob, "BTC"), d("0"));
    assert_eq!(total(&exchange, bob, "USD"), d("100"));

    let snapshot = exchange.get_orderbook("BTCUSD").unwrap();
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());
    assert_book_invariants(&exchange);
}

#[test]
fn market_buy_partially_fills_resting_ask() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "2");

    exchange.sell(bob, "BTCUSD", d("2"), Some(d("50"))).unwrap();
    exchange.buy(alice, "BTCUSD", d("1"), None).unwrap();

    let tape = exchange.get_trades("BTCUSD").unwrap();
    assert_eq!(tape.len(), 1);
    assert_eq!(tape[0].quantity, d("1"));
    assert_eq!(tape[0].price, d("50"));

    let snapshot = exchange.get_orderbook("BTCUSD").unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].volume, d("1"));

    assert_eq!(total(&exchange, alice, "BTC"), d("1"));
    assert_eq!(total(&exchange, alice, "USD"), d("950"));
    assert_eq!(unlocked(&exchange, bob, "USD"), d("50"));
    assert_eq!(locked(&exchange, bob, "BTC"), d("1"));
    assert_book_invariants(&exchange);
}

#[test]
fn crossing_limit_buy_sweeps_two_price_levels() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "1");
    let carol = funded(&mut exchange, "carol", "0", "1");

    exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    exchange.sell(carol, "BTCUSD", d("1"), Some(d("110"))).unwrap();
    exchange.buy(alice, "BTCUSD", d("2"), Some(d("120"))).unwrap();

    let tape = exchange.get_trades("BTCUSD").unwrap();
    assert_eq!(tape.len(), 2);
    assert_eq!((tape[0].price, tape[0].quantity), (d("100"), d("1")));
    assert_eq!((tape[1].price, tape[1].quantity), (d("110"), d("1")));

    // the lock covered exactly the two fills, so nothing stays locked
    assert_eq!(total(&exchange, alice, "BTC"), d("2"));
    assert_eq!(unlocked(&exchange, alice, "USD"), d("790"));
    assert_eq!(locked(&exchange, alice, "USD"), d("0"));
    assert_book_invariants(&exchange);
}

#[test]
fn limit_buy_fills_then_rests_the_remainder() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "1");

    exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    exchange.buy(alice, "BTCUSD", d("3"), Some(d("105"))).unwrap();

    // one fill at the maker price, two units resting at the limit
    let tape = exchange.get_trades("BTCUSD").unwrap();
    assert_eq!(tape.len(), 1);
    assert_eq!(tape[0].price, d("100"));

    let snapshot = exchange.get_orderbook("BTCUSD").unwrap();
    assert!(snapshot.asks.is_empty());
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].price, d("105"));
    assert_eq!(snapshot.bids[0].volume, d("2"));

    // locked 100 + 2*105 up front, settled 100 of it
    assert_eq!(locked(&exchange, alice, "USD"), d("210"));
    assert_eq!(unlocked(&exchange, alice, "USD"), d("690"));
    assert_eq!(total(&exchange, alice, "BTC"), d("1"));
    assert_book_invariants(&exchange);
}

#[test]
fn market_sell_rejected_on_thin_book() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "0", "1");

    let err = exchange.sell(alice, "BTCUSD", d("1"), None).unwrap_err();
    assert_eq!(err, ExchangeError::InsufficientLiquidity);

    assert_eq!(unlocked(&exchange, alice, "BTC"), d("1"));
    assert_eq!(locked(&exchange, alice, "BTC"), d("0"));
    assert!(exchange.get_orders(alice, "BTCUSD", None).unwrap().is_empty());
}

#[test]
fn market_buy_rejected_on_thin_book() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");

    let err = exchange.buy(alice, "BTCUSD", d("1"), None).unwrap_err();
    assert_eq!(err, ExchangeError::InsufficientLiquidity);
    assert_eq!(unlocked(&exchange, alice, "USD"), d("1000"));
}

#[test]
fn cancel_unlocks_the_full_residual() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");

    let order = exchange.buy(alice, "BTCUSD", d("5"), Some(d("100"))).unwrap();
    assert_eq!(unlocked(&exchange, alice, "USD"), d("500"));
    assert_eq!(locked(&exchange, alice, "USD"), d("500"));

    exchange.cancel(alice, "BTCUSD", order).unwrap();
    assert_eq!(unlocked(&exchange, alice, "USD"), d("1000"));
    assert_eq!(locked(&exchange, alice, "USD"), d("0"));

    let records = exchange.get_orders(alice, "BTCUSD", None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OrderStatus::Canceled);
    let lists = exchange.account(alice).unwrap().orders("BTCUSD").unwrap();
    assert!(lists.open.is_empty());
    assert_eq!(lists.closed, vec![order]);
}

#[test]
fn cancel_after_partial_fill_unlocks_only_the_rest() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "1");

    exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    let order = exchange.buy(alice, "BTCUSD", d("2"), Some(d("100"))).unwrap();

    // one unit traded and settled, one unit still backed by the lock
    assert_eq!(locked(&exchange, alice, "USD"), d("100"));
    exchange.cancel(alice, "BTCUSD", order).unwrap();

    assert_eq!(locked(&exchange, alice, "USD"), d("0"));
    assert_eq!(unlocked(&exchange, alice, "USD"), d("900"));
    assert_eq!(total(&exchange, alice, "BTC"), d("1"));
    assert_book_invariants(&exchange);
}

#[test]
fn cancel_rejects_foreign_filled_and_unknown_orders() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "1");

    let ask = exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();

    // not the owner
    assert_eq!(
        exchange.cancel(alice, "BTCUSD", ask).unwrap_err(),
        ExchangeError::OrderNotCancellable(ask)
    );

    // filled orders are no longer OPEN
    exchange.buy(alice, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    assert_eq!(
        exchange.cancel(bob, "BTCUSD", ask).unwrap_err(),
        ExchangeError::OrderNotCancellable(ask)
    );

    // never existed
    assert_eq!(
        exchange.cancel(bob, "BTCUSD", 999).unwrap_err(),
        ExchangeError::OrderNotCancellable(999)
    );
}

#[test]
fn resting_then_cancelling_restores_wallets_exactly() {
    let mut exchange = venue();
    let bob = funded(&mut exchange, "bob", "250", "3");
    let before = exchange.get_wallet(bob).unwrap();

    let order = exchange.sell(bob, "BTCUSD", d("2"), Some(d("120"))).unwrap();
    assert_eq!(locked(&exchange, bob, "BTC"), d("2"));
    exchange.cancel(bob, "BTCUSD", order).unwrap();

    let after = exchange.get_wallet(bob).unwrap();
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.symbol, a.symbol);
        assert_eq!(b.total, a.total);
        assert_eq!(b.unlocked, a.unlocked);
    }
}

#[test]
fn market_order_drains_makers_in_price_time_order() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let bob = funded(&mut exchange, "bob", "0", "3");

    exchange.sell(bob, "BTCUSD", d("1"), Some(d("102"))).unwrap();
    exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
    exchange.sell(bob, "BTCUSD", d("1"), Some(d("101"))).unwrap();

    exchange.buy(alice, "BTCUSD", d("3"), None).unwrap();

    let tape = exchange.get_trades("BTCUSD").unwrap();
    let prices: Vec<Decimal> = tape.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![d("100"), d("101"), d("102")]);

    let snapshot = exchange.get_orderbook("BTCUSD").unwrap();
    assert!(snapshot.asks.is_empty());
    assert_eq!(total(&exchange, alice, "BTC"), d("3"));
    assert_eq!(total(&exchange, alice, "USD"), d("697"));
}

#[test]
fn matching_is_deterministic_for_the_same_flow() {
    let run = || {
        let mut exchange = venue();
        let alice = funded(&mut exchange, "alice", "5000", "0");
        let bob = funded(&mut exchange, "bob", "0", "10");
        exchange.sell(bob, "BTCUSD", d("2"), Some(d("101"))).unwrap();
        exchange.sell(bob, "BTCUSD", d("3"), Some(d("100"))).unwrap();
        exchange.sell(bob, "BTCUSD", d("1"), Some(d("100"))).unwrap();
        exchange.buy(alice, "BTCUSD", d("4"), Some(d("101"))).unwrap();
        let tape: Vec<(Decimal, Decimal)> = exchange
            .get_trades("BTCUSD")
            .unwrap()
            .iter()
            .map(|t| (t.price, t.quantity))
            .collect();
        let snapshot = exchange.get_orderbook("BTCUSD").unwrap();
        (tape, snapshot.bids, snapshot.asks)
    };
    assert_eq!(run(), run());
}

#[test]
fn value_is_conserved_across_mixed_flow() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "2000", "5");
    let bob = funded(&mut exchange, "bob", "1500", "5");
    let carol = funded(&mut exchange, "carol", "1000", "5");
    let everyone = [alice, bob, carol];

    let usd = supply(&exchange, &everyone, "USD");
    let btc = supply(&exchange, &everyone, "BTC");

    exchange.sell(bob, "BTCUSD", d("2"), Some(d("100"))).unwrap();
    exchange.sell(carol, "BTCUSD", d("1"), Some(d("99"))).unwrap();
    exchange.buy(alice, "BTCUSD", d("2"), Some(d("100"))).unwrap();
    let resting = exchange.buy(alice, "BTCUSD", d("3"), Some(d("95"))).unwrap();
    exchange.sell(carol, "BTCUSD", d("1"), None).unwrap();
    exchange.cancel(alice, "BTCUSD", resting).unwrap();
    exchange.buy(bob, "BTCUSD", d("1"), Some(d("98"))).unwrap();

    assert_eq!(supply(&exchange, &everyone, "USD"), usd);
    assert_eq!(supply(&exchange, &everyone, "BTC"), btc);
    assert_book_invariants(&exchange);

    // only deposits and withdrawals move the totals
    exchange.withdraw(alice, "USD", d("10")).unwrap();
    assert_eq!(supply(&exchange, &everyone, "USD"), usd - d("10"));
}

#[test]
fn deposit_and_withdraw_quantise_and_validate() {
    let mut exchange = venue();
    let alice = exchange.register_account("alice");

    exchange.deposit(alice, "USD", d("100")).unwrap();
    assert_eq!(
        exchange.deposit(alice, "USD", d("0")).unwrap_err(),
        ExchangeError::InvalidQuantity
    );
    // rounds to 0.00 at two decimals, so it is a no-op failure
    assert_eq!(
        exchange.deposit(alice, "USD", d("0.004")).unwrap_err(),
        ExchangeError::InvalidQuantity
    );
    exchange.deposit(alice, "USD", d("10.005")).unwrap();
    assert_eq!(unlocked(&exchange, alice, "USD"), d("110.00"));

    exchange.withdraw(alice, "USD", d("30")).unwrap();
    assert_eq!(unlocked(&exchange, alice, "USD"), d("80.00"));
    assert!(matches!(
        exchange.withdraw(alice, "USD", d("200")).unwrap_err(),
        ExchangeError::InsufficientBalance { .. }
    ));
    assert_eq!(
        exchange.withdraw(alice, "USD", d("-5")).unwrap_err(),
        ExchangeError::InvalidQuantity
    );
}

#[test]
fn orders_quantise_to_the_symbol_precision() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");

    // 1.005 BTC rounds to 1.00 at two decimals; 99.999 USD rounds to 100.00
    let order = exchange
        .buy(alice, "BTCUSD", d("1.005"), Some(d("99.999")))
        .unwrap();
    let record = &exchange.get_orders(alice, "BTCUSD", None).unwrap()[0];
    assert_eq!(record.id, order);
    assert_eq!(record.quantity, d("1.00"));
    assert_eq!(record.price, Some(d("100.00")));
}

#[test]
fn submissions_validate_account_market_and_parameters() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "100", "0");

    assert_eq!(
        exchange.buy(99, "BTCUSD", d("1"), Some(d("10"))).unwrap_err(),
        ExchangeError::UnknownAccount(99)
    );
    assert_eq!(
        exchange.buy(alice, "ETHUSD", d("1"), Some(d("10"))).unwrap_err(),
        ExchangeError::UnknownMarket("ETHUSD".to_string())
    );
    assert_eq!(
        exchange.buy(alice, "BTCUSD", d("-1"), Some(d("10"))).unwrap_err(),
        ExchangeError::InvalidQuantity
    );
    assert_eq!(
        exchange.buy(alice, "BTCUSD", d("1"), Some(d("0"))).unwrap_err(),
        ExchangeError::InvalidPrice
    );
    assert!(matches!(
        exchange.buy(alice, "BTCUSD", d("5"), Some(d("100"))).unwrap_err(),
        ExchangeError::InsufficientBalance { .. }
    ));
    // nothing was admitted or locked along the way
    assert!(exchange.get_orders(alice, "BTCUSD", None).unwrap().is_empty());
    assert_eq!(unlocked(&exchange, alice, "USD"), d("100"));
}

#[test]
fn registration_rejects_duplicates_and_unknown_symbols() {
    let mut exchange = venue();
    assert_eq!(
        exchange.register_symbol("BTC", 2).unwrap_err(),
        ExchangeError::DuplicateSymbol("BTC".to_string())
    );
    assert_eq!(
        exchange.register_market("BTC", "USD").unwrap_err(),
        ExchangeError::DuplicateMarket("BTCUSD".to_string())
    );
    assert_eq!(
        exchange.register_market("ETH", "USD").unwrap_err(),
        ExchangeError::UnknownSymbol("ETH".to_string())
    );
    assert_eq!(
        exchange.register_symbol("B T C", 2).unwrap_err(),
        ExchangeError::InvalidSymbol("unsupported ticker: \"B T C\"".to_string())
    );
}

#[test]
fn process_quote_dispatches_on_shape() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");

    let ack = exchange
        .process_quote(&QuoteRequest {
            account_id: alice,
            market: "BTCUSD".to_string(),
            side: Some(exchange_engine::orders::Side::Buy),
            quantity: Some(d("1")),
            price: Some(d("100")),
            order_id: None,
        })
        .unwrap();
    let QuoteAck::Order(order_id) = ack else {
        panic!("expected an order ack, got {ack:?}");
    };

    let ack = exchange
        .process_quote(&QuoteRequest {
            account_id: alice,
            market: "BTCUSD".to_string(),
            side: None,
            quantity: None,
            price: None,
            order_id: Some(order_id),
        })
        .unwrap();
    assert_eq!(ack, QuoteAck::Canceled(order_id));

    let err = exchange
        .process_quote(&QuoteRequest {
            account_id: alice,
            market: "BTCUSD".to_string(),
            side: None,
            quantity: Some(d("1")),
            price: None,
            order_id: None,
        })
        .unwrap_err();
    assert_eq!(err, ExchangeError::MalformedQuote);
}

/// Every account's open list holds only OPEN orders and every closed list
/// only FILLED or CANCELED ones.
fn assert_order_lists_consistent(exchange: &Exchange, accounts: &[u64]) {
    let market = exchange.market("BTCUSD").unwrap();
    for id in accounts {
        let Some(lists) = exchange.account(*id).unwrap().orders("BTCUSD") else {
            continue;
        };
        for order_id in &lists.open {
            assert_eq!(market.order(*order_id).unwrap().status, OrderStatus::Open);
        }
        for order_id in &lists.closed {
            let status = market.order(*order_id).unwrap().status;
            assert!(matches!(status, OrderStatus::Filled | OrderStatus::Canceled));
        }
    }
}

#[test]
fn invariants_hold_under_seeded_random_flow() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut exchange = venue();
    let traders = [
        funded(&mut exchange, "alice", "50000", "50"),
        funded(&mut exchange, "bob", "50000", "50"),
        funded(&mut exchange, "carol", "50000", "50"),
    ];
    let usd = supply(&exchange, &traders, "USD");
    let btc = supply(&exchange, &traders, "BTC");

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..300 {
        let account = traders[rng.random_range(0..traders.len())];

        if rng.random_bool(0.15) {
            let open = exchange
                .get_orders(account, "BTCUSD", Some(OrderStatus::Open))
                .unwrap();
            if let Some(order) = open.first() {
                exchange.cancel(account, "BTCUSD", order.id).unwrap();
            }
        } else {
            let quantity = Decimal::from(rng.random_range(1..=5u32));
            let price = if rng.random_bool(0.2) {
                None
            } else {
                Some(Decimal::from(rng.random_range(90..=110u32)))
            };
            // rejections are fine; they must simply not move any balance
            let _ = if rng.random_bool(0.5) {
                exchange.buy(account, "BTCUSD", quantity, price)
            } else {
                exchange.sell(account, "BTCUSD", quantity, price)
            };
        }

        assert_eq!(supply(&exchange, &traders, "USD"), usd);
        assert_eq!(supply(&exchange, &traders, "BTC"), btc);
        for id in &traders {
            for entry in exchange.get_wallet(*id).unwrap() {
                assert!(entry.total >= Decimal::ZERO);
                assert!(entry.unlocked >= Decimal::ZERO);
            }
        }
        assert_book_invariants(&exchange);
        assert_order_lists_consistent(&exchange, &traders);
    }
}

#[test]
fn market_keys_are_case_insensitive_at_the_surface() {
    let mut exchange = venue();
    let alice = funded(&mut exchange, "alice", "1000", "0");
    let order = exchange.buy(alice, "btcusd", d("1"), Some(d("50"))).unwrap();
    assert_eq!(
        exchange.get_orders(alice, "btcusd", None).unwrap()[0].id,
        order
    );
    exchange.cancel(alice, "BtcUsd", order).unwrap();
}
