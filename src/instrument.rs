use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An uppercase ticker, e.g. `BTC` or `USD`.
///
/// Symbols are listed on the exchange together with the decimal precision
/// (`unit_decimals`) used to quantise every quantity denominated in them.
/// Input is normalised to ASCII uppercase; serde treats a symbol as a plain
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("unsupported ticker: {s:?}"));
        }
        Ok(Symbol(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> String {
        symbol.0
    }
}

//A trading pair: base/quote
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    /// The asset you buy or sell
    pub base: Symbol,
    /// The asset you pay or receive
    pub quote: Symbol,
}

impl Pair {
    /// The market key: base and quote concatenated, e.g. `BTCUSD`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}
