use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from the exchange's public operations.
///
/// Every failure is returned as a value; nothing panics across the public
/// surface, and a failed operation leaves all state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("unknown account id: {0}")]
    UnknownAccount(u64),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("unknown market: {0}")]
    UnknownMarket(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("symbol already listed: {0}")]
    DuplicateSymbol(String),

    #[error("market already registered: {0}")]
    DuplicateMarket(String),

    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("price must be positive")]
    InvalidPrice,

    #[error("insufficient {symbol} balance: required {required}, available {available}")]
    InsufficientBalance {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("not enough resting orders to fill the order")]
    InsufficientLiquidity,

    #[error("order {0} is not open or not owned by the caller")]
    OrderNotCancellable(u64),

    #[error("quote carries neither an order id nor a side")]
    MalformedQuote,
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
