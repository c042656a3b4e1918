//! Constraint strengths, packed as three weighted tiers.

pub const REQUIRED: f64 = 1_001_001_000.0;
pub const STRONG: f64 = 1_000_000.0;
pub const MEDIUM: f64 = 1_000.0;
pub const WEAK: f64 = 1.0;

/// Combine three tier weights (each clamped to `0..=1000`) scaled by `w`.
pub fn create(a: f64, b: f64, c: f64, w: f64) -> f64 {
    let tier = |value: f64| (value * w).clamp(0.0, 1000.0);
    tier(a) * 1_000_000.0 + tier(b) * 1_000.0 + tier(c)
}

pub fn clip(strength: f64) -> f64 {
    strength.clamp(0.0, REQUIRED)
}

pub fn is_required(strength: f64) -> bool {
    strength >= REQUIRED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_strengths_match_tiers() {
        assert_eq!(create(1.0, 0.0, 0.0, 1.0), STRONG);
        assert_eq!(create(0.0, 1.0, 0.0, 1.0), MEDIUM);
        assert_eq!(create(0.0, 0.0, 1.0, 1.0), WEAK);
        assert_eq!(create(1000.0, 1000.0, 1000.0, 1.0), REQUIRED);
    }

    #[test]
    fn clip_caps_at_required() {
        assert_eq!(clip(REQUIRED * 2.0), REQUIRED);
        assert_eq!(clip(-3.0), 0.0);
    }
}
