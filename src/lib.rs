//! A single-venue, in-memory spot-exchange simulator.
//!
//! Per-market limit order books with price-time-priority matching, and a
//! two-bucket ledger (locked/unlocked) that keeps every participant wallet
//! consistent with every trade: no buy, sell or cancel ever creates or
//! destroys value.

pub mod asset;
pub mod errors;
pub mod exchange;
pub mod instrument;
pub mod market;
pub mod orderbook;
pub mod orders;
pub mod simulate;
pub mod trade;
pub mod utils;
