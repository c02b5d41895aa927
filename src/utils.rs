//monotonic time source shared by every module that stamps
//orders, trades and tape entries
use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds since the process-local epoch.
///
/// Backed by [`Instant`], so the value never decreases. Two calls close
/// together may return the same timestamp; ties between orders are broken by
/// queue insertion order, never by time.
pub fn now_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}
