//! Monotonic time for the substrate, in 100 ns units.

use std::time::Instant;

use once_cell::sync::Lazy;

/// The process-wide epoch that [`monotonic_time`] measures from.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Current monotonic time in 100 ns units, measured from a process-wide
/// epoch. Never goes backwards.
pub fn monotonic_time() -> u64 {
    // 1 unit = 100 ns
    (EPOCH.elapsed().as_nanos() / 100) as u64
}
