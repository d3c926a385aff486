/// Smallest queue capacity the dynamic queue will ever settle on.
pub const MIN_ALLOWED_CAPACITY: u32 = 1;

/// Largest capacity `set_capacity`/`set_max_capacity` will accept; matches the
/// 16-bit-plus-one ceiling of the original server (capacities are always a
/// power of two, so this rounds down to `1 << 16`).
pub const MAX_ALLOWED_CAPACITY: u32 = 1 << 16;

/// Absolute ceiling `put_always` may grow a queue to. Only paths that must
/// never block or fail (notably the optimizer's delete-notice path) use it.
pub const ABSOLUTE_MAX_CAPACITY: u32 = 1 << 31;

/// Rounds `n` up to the next power of two, clamped to `[1, u32::MAX]`.
#[must_use]
pub fn next_power_of_two(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// Clamps a requested capacity into `[MIN_ALLOWED_CAPACITY, MAX_ALLOWED_CAPACITY]`
/// and rounds it up to a power of two.
#[must_use]
pub fn validate_capacity(capacity: u32) -> u32 {
    let clamped = capacity.clamp(MIN_ALLOWED_CAPACITY, MAX_ALLOWED_CAPACITY);
    next_power_of_two(clamped)
}

/// Static configuration for a [`crate::DynamicQueue`].
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Initial capacity (rounded up to a power of two, clamped to the allowed range).
    pub capacity: u32,
    /// Capacity the queue will grow up to via ordinary `put`. `put_always` may
    /// exceed this, up to [`ABSOLUTE_MAX_CAPACITY`].
    pub max_capacity: u32,
}

impl QueueConfig {
    /// Creates a configuration, validating and ordering `capacity`/`max_capacity`.
    #[must_use]
    pub fn new(capacity: u32, max_capacity: u32) -> Self {
        let max_capacity = validate_capacity(max_capacity.max(capacity));
        let capacity = validate_capacity(capacity).min(max_capacity);
        Self { capacity, max_capacity }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(64, 4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_power_of_two() {
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(5), 8);
        assert_eq!(next_power_of_two(64), 64);
    }

    #[test]
    fn validate_capacity_clamps_range() {
        assert_eq!(validate_capacity(0), MIN_ALLOWED_CAPACITY);
        assert_eq!(validate_capacity(u32::MAX), MAX_ALLOWED_CAPACITY);
        assert_eq!(validate_capacity(100), 128);
    }

    #[test]
    fn config_orders_capacity_below_max() {
        let cfg = QueueConfig::new(4096, 64);
        assert!(cfg.capacity <= cfg.max_capacity);
    }
}
