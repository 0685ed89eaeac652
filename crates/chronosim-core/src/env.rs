//! Environment abstraction for deterministic scenarios.
//!
//! The `Environment` trait decouples the scenario driver from its source of
//! randomness. Simulations hand every driver a seeded generator so a run can
//! be replayed exactly. Time is not part of the trait: the driver never reads
//! a clock, it only asks its runtime to schedule timers.
//!
//! # Invariants
//!
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

/// Abstract source of randomness.
///
/// # Safety
///
/// Implementations MUST guarantee that two environments built from the same
/// seed produce identical byte streams when queried in the same order.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Draws a uniformly distributed integer from `low..=high`.
    ///
    /// Uses rejection sampling so every value in the range is equally likely.
    /// If `low > high` the bounds are swapped.
    fn random_range(&self, low: u64, high: u64) -> u64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };

        // span == 0 means the full u64 range
        let span = high.wrapping_sub(low).wrapping_add(1);
        if span == 0 {
            return self.random_u64();
        }

        // 2^64 mod span: the number of values at the top of the u64 range
        // that would bias the modulo.
        let rejected = (u64::MAX % span + 1) % span;
        loop {
            let candidate = self.random_u64();
            if rejected == 0 || candidate <= u64::MAX - rejected {
                return low + candidate % span;
            }
        }
    }
}
