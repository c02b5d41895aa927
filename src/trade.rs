use crate::orders::Side;
use rust_decimal::Decimal;
use serde::Serialize;

/// A trade represents a matched transaction between two orders
///
/// - The price comes from the makers order (i.e resting order)
/// - Quantity is the amount filled
/// - the taker is the incoming order that triggered the trade.
///
/// `side` is the maker's side. A trade is immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub id: u64,
    pub time: u64,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Account id of the resting order's owner.
    pub maker: u64,
    /// Account id of the incoming order's owner.
    pub taker: u64,
}

/// One entry of a market's trade tape.
#[derive(Debug, Clone, Serialize)]
pub struct Tick {
    pub time: u64,
    pub price: Decimal,
    pub quantity: Decimal,
}
