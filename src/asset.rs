use rust_decimal::Decimal;

/// Quantise `quantity` to `decimals` fractional digits.
///
/// Midpoints round to even, the same rule the reference venue applies to
/// every quantity at ingress.
pub fn quantize(quantity: Decimal, decimals: u32) -> Decimal {
    quantity.round_dp(decimals)
}

/// A single-symbol balance split into two buckets.
///
/// `locked` backs open orders and cannot be spent; `unlocked` is free for
/// withdrawal or new orders. Both buckets are non-negative at every
/// observable point. Each setter replaces one bucket at a time; the exchange
/// composes them into the paired lock/unlock/settlement moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asset {
    unlocked: Decimal,
    locked: Decimal,
}

impl Asset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlocked(&self) -> Decimal {
        self.unlocked
    }

    pub fn locked(&self) -> Decimal {
        self.locked
    }

    pub fn total(&self) -> Decimal {
        self.unlocked + self.locked
    }

    /// Replace the unlocked bucket. A negative value means the caller broke
    /// the lock/settle discipline.
    pub fn set_unlocked(&mut self, quantity: Decimal) {
        assert!(quantity >= Decimal::ZERO, "unlocked balance went negative");
        self.unlocked = quantity;
    }

    /// Replace the locked bucket. A negative value means the caller broke
    /// the lock/settle discipline.
    pub fn set_locked(&mut self, quantity: Decimal) {
        assert!(quantity >= Decimal::ZERO, "locked balance went negative");
        self.locked = quantity;
    }
}
