use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,  //Bid,
    Sell, //Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// Derived from the presence of a price: an order submitted with a price is
/// a limit order, one without is a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => f.write_str("OPEN"),
            OrderStatus::Filled => f.write_str("FILLED"),
            OrderStatus::Canceled => f.write_str("CANCELED"),
        }
    }
}

/// A single order on one market.
///
/// `quantity` is the remaining unfilled amount and only ever decreases;
/// `initial_quantity` never changes after creation. An order is OPEN until
/// matching drains it (FILLED) or the owner cancels it (CANCELED); a
/// partially filled resting order stays OPEN with reduced `quantity`.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub time: u64,
    /// Account id of the submitter.
    pub owner: u64,
    pub side: Side,
    pub quantity: Decimal,
    pub initial_quantity: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    /// Ids of the trades this order participated in, oldest first.
    pub trades: Vec<u64>,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        }
    }
}
