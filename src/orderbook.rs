use crate::orders::Order;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, btree_map};
use tracing::warn;

/// An [`OrderBook`] stores **resting** buy and sell orders in two
/// [`OrderTree`]s:
/// - `bids` (buy orders, best = highest price)
/// - `asks` (sell orders, best = lowest price)
///
/// Each price level holds a FIFO [`OrderQueue`] of order ids to maintain
/// **price-time** priority. The book never owns the order records; the
/// market's order registry does.
#[derive(Debug)]
pub struct OrderBook {
    pub bids: OrderTree,
    pub asks: OrderTree,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: OrderTree::new(false),
            asks: OrderTree::new(true),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct QueueNode {
    prev: Option<u64>,
    next: Option<u64>,
}

/// FIFO of the orders resting at one price level.
///
/// Ids are threaded through an arena of prev/next nodes keyed by order id,
/// so `append` and `remove` of a known id are both O(1) — a cancel never
/// scans the level.
#[derive(Debug, Default)]
pub struct OrderQueue {
    head: Option<u64>,
    tail: Option<u64>,
    nodes: HashMap<u64, QueueNode>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Id of the earliest arrival still in the queue.
    pub fn head(&self) -> Option<u64> {
        self.head
    }

    /// Link `id` at the tail.
    pub fn append(&mut self, id: u64) {
        self.nodes.insert(
            id,
            QueueNode {
                prev: self.tail,
                next: None,
            },
        );
        match self.tail {
            Some(tail) => {
                if let Some(node) = self.nodes.get_mut(&tail) {
                    node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Unlink `id`, stitching its neighbours together. Returns whether the
    /// id was present.
    pub fn remove(&mut self, id: u64) -> bool {
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(&prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(&next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        true
    }

    /// Ids front to back.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::successors(self.head, |id| self.nodes.get(id).and_then(|n| n.next))
    }
}

/// Internal enum to unify forward (`Iter`) and reverse (`Rev<Iter>`) BTreeMap iteration.
///
/// - [`DepthIter::Fwd`] handles ascending iteration over prices (asks).
/// - [`DepthIter::Rev`] handles descending iteration (bids, highest first).
enum DepthIter<'a> {
    /// Forward (ascending) iteration over the price levels.
    Fwd(btree_map::Iter<'a, Decimal, Decimal>),
    /// Reverse (descending) iteration over the price levels.
    Rev(std::iter::Rev<btree_map::Iter<'a, Decimal, Decimal>>),
}

impl<'a> Iterator for DepthIter<'a> {
    type Item = (&'a Decimal, &'a Decimal);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            DepthIter::Fwd(iter) => iter.next(),
            DepthIter::Rev(iter) => iter.next(),
        }
    }
}

/// One side of the book: a price-indexed collection of [`OrderQueue`]s.
///
/// `depth` mirrors the level map with the aggregate resting quantity per
/// price, and `volume` is the total across all levels. `ascending` fixes the
/// orientation — asks ascend (best = lowest), bids descend (best = highest)
/// — so `top` is always the most aggressive resting order.
#[derive(Debug)]
pub struct OrderTree {
    ascending: bool,
    levels: BTreeMap<Decimal, OrderQueue>,
    depth: BTreeMap<Decimal, Decimal>,
    volume: Decimal,
}

impl OrderTree {
    pub fn new(ascending: bool) -> Self {
        Self {
            ascending,
            levels: BTreeMap::new(),
            depth: BTreeMap::new(),
            volume: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total resting quantity across all price levels.
    pub fn volume(&self) -> Decimal {
        self.volume
    }

    /// Best price on this side: lowest for asks, highest for bids.
    pub fn best_price(&self) -> Option<Decimal> {
        if self.ascending {
            self.levels.keys().next().copied()
        } else {
            self.levels.keys().next_back().copied()
        }
    }

    /// Id of the order at the head of the best price level.
    pub fn top(&self) -> Option<u64> {
        self.best_price()
            .and_then(|price| self.levels.get(&price))
            .and_then(|queue| queue.head())
    }

    /// Aggregate resting quantity at `price`, zero if the level is gone.
    pub fn depth_at(&self, price: Decimal) -> Decimal {
        self.depth.get(&price).copied().unwrap_or_default()
    }

    /// `(price, depth)` pairs, best level first.
    pub fn depths(&self) -> impl Iterator<Item = (Decimal, Decimal)> + '_ {
        let iter = if self.ascending {
            DepthIter::Fwd(self.depth.iter())
        } else {
            DepthIter::Rev(self.depth.iter().rev())
        };
        iter.map(|(price, depth)| (*price, *depth))
    }

    /// Rest `order` on this side, creating its price level on first use.
    pub fn push(&mut self, order: &Order) {
        let Some(price) = order.price else {
            warn!(id = order.id, "refusing to rest an order without a price");
            return;
        };
        self.levels.entry(price).or_default().append(order.id);
        *self.depth.entry(price).or_insert(Decimal::ZERO) += order.quantity;
        self.volume += order.quantity;
    }

    /// Unlink `order` and remove its remaining quantity from the level depth
    /// and the tree volume, pruning the level if it empties.
    pub fn pop(&mut self, order: &Order) {
        let Some(price) = order.price else {
            return;
        };
        let mut emptied = false;
        if let Some(queue) = self.levels.get_mut(&price) {
            queue.remove(order.id);
            emptied = queue.is_empty();
        }
        if let Some(depth) = self.depth.get_mut(&price) {
            *depth -= order.quantity;
        }
        self.volume -= order.quantity;
        if emptied {
            self.levels.remove(&price);
            self.depth.remove(&price);
        }
    }

    /// In-place adjustment for a partial fill: the traded amount leaves the
    /// level depth and the volume while the maker stays at the queue head.
    pub fn reduce(&mut self, price: Decimal, amount: Decimal) {
        if let Some(depth) = self.depth.get_mut(&price) {
            *depth -= amount;
        }
        self.volume -= amount;
    }
}

/// Aggregated depth per price level, best to worst on both sides.
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub market: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub volume: Decimal,
}
