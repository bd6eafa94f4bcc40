//! Weight to item-count conversion.
//!
//! Shelves never sit perfectly still, so the rounding is biased toward the
//! quantity already on the shelf: a positive raw count must clear `n + 0.8`
//! before it rounds up to `n + 1`, and a negative one must pass `-0.79`
//! before it counts as a removed item.

/// Positive raw counts are pulled down by this much before rounding.
pub const POSITIVE_DEAD_ZONE: f64 = 0.3;

/// Negative (and zero) raw counts are pushed up by this much before rounding.
pub const NEGATIVE_DEAD_ZONE: f64 = 0.29;

/// Round half up, independent of sign (`-1.5` rounds to `-1`).
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Unrounded item count for `net_weight`. Degenerate unit weights yield 0.
pub fn raw_quantity(net_weight: f64, unit_weight: f64) -> f64 {
    if unit_weight == 0.0 {
        return 0.0;
    }
    let raw = net_weight / unit_weight;
    if raw.is_finite() {
        raw
    } else {
        0.0
    }
}

/// Rounded item count with the dead zone applied.
pub fn rounded_quantity(raw: f64) -> i64 {
    if raw > 0.0 {
        round_half_up(raw - POSITIVE_DEAD_ZONE)
    } else {
        round_half_up(raw + NEGATIVE_DEAD_ZONE)
    }
}

/// Item count for a reading against a tare.
pub fn quantity_at(weight: f64, zero_weight: f64, unit_weight: f64) -> i64 {
    rounded_quantity(raw_quantity(weight - zero_weight, unit_weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_zone_rounding() {
        assert_eq!(rounded_quantity(2.31), 2);
        assert_eq!(rounded_quantity(2.29), 2);
        assert_eq!(rounded_quantity(2.8), 3);
        assert_eq!(rounded_quantity(-0.1), 0);
        assert_eq!(rounded_quantity(-0.8), -1);
        assert_eq!(rounded_quantity(0.0), 0);
    }

    #[test]
    fn test_halves_round_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-1.5), -1);
        assert_eq!(round_half_up(-0.5), 0);
    }

    #[test]
    fn test_degenerate_unit_weight() {
        assert_eq!(raw_quantity(100.0, 0.0), 0.0);
        assert_eq!(raw_quantity(f64::NAN, 10.0), 0.0);
        assert_eq!(raw_quantity(f64::INFINITY, 10.0), 0.0);
        assert_eq!(quantity_at(500.0, 100.0, 0.0), 0);
    }

    #[test]
    fn test_quantity_at() {
        // Three 50 g items on a 1000 g tare.
        assert_eq!(quantity_at(1150.0, 1000.0, 50.0), 3);
        // Two removed, with a little jitter.
        assert_eq!(quantity_at(901.0, 1000.0, 50.0), -2);
    }
}
