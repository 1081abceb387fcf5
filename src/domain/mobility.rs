//! Mobility profiles - time-decayed hysteresis for location changes
//!
//! The weight is the dBm margin a challenging antenna must beat the
//! incumbent by. It starts at `threshold` right after a read at the
//! incumbent location and falls linearly as that evidence ages.

use serde::Deserialize;

/// Hysteresis parameters: `weight = slope * elapsed_ms + intercept`,
/// capped above at `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "MobilityParams")]
pub struct MobilityProfile {
    slope: f64,
    threshold: f64,
    holdoff_ms: f64,
    intercept: f64,
}

/// Raw profile parameters as they appear in configuration
#[derive(Debug, Clone, Copy, Deserialize)]
struct MobilityParams {
    slope: f64,
    threshold: f64,
    #[serde(default)]
    holdoff: f64,
}

impl From<MobilityParams> for MobilityProfile {
    fn from(p: MobilityParams) -> Self {
        Self::new(p.slope, p.threshold, p.holdoff)
    }
}

impl MobilityProfile {
    pub const DEFAULT_SLOPE: f64 = -0.008;
    pub const DEFAULT_THRESHOLD: f64 = 6.0;
    pub const DEFAULT_HOLDOFF_MS: f64 = 0.0;

    pub fn new(slope: f64, threshold: f64, holdoff_ms: f64) -> Self {
        Self { slope, threshold, holdoff_ms, intercept: threshold - slope * holdoff_ms }
    }

    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[inline]
    pub fn holdoff_ms(&self) -> f64 {
        self.holdoff_ms
    }

    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// All parameters are finite numbers
    pub fn is_valid(&self) -> bool {
        self.slope.is_finite() && self.threshold.is_finite() && self.holdoff_ms.is_finite()
    }

    /// Switching margin for a challenger, given when the incumbent location
    /// was last read. Deep-scanning sensors always get the full threshold.
    pub fn weight(&self, last_read_at_incumbent: u64, now: u64, deep_scan: bool) -> f64 {
        if deep_scan {
            return self.threshold;
        }
        let elapsed_ms = now as f64 - last_read_at_incumbent as f64;
        let weight = self.slope * elapsed_ms + self.intercept;
        weight.min(self.threshold)
    }
}

impl Default for MobilityProfile {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLOPE, Self::DEFAULT_THRESHOLD, Self::DEFAULT_HOLDOFF_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = MobilityProfile::default();
        assert_eq!(profile.slope(), -0.008);
        assert_eq!(profile.threshold(), 6.0);
        assert_eq!(profile.intercept(), 6.0);
    }

    #[test]
    fn test_intercept_from_holdoff() {
        let profile = MobilityProfile::new(-0.01, 4.0, 500.0);
        // B = T - M*A = 4 - (-0.01 * 500) = 9
        assert!((profile.intercept() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_starts_at_threshold_and_decays() {
        let profile = MobilityProfile::default();
        assert!((profile.weight(10_000, 10_000, false) - 6.0).abs() < 1e-9);
        assert!((profile.weight(10_000, 10_250, false) - 4.0).abs() < 1e-9);
        // No lower bound
        assert!(profile.weight(10_000, 12_000, false) < 0.0);
    }

    #[test]
    fn test_weight_capped_during_holdoff() {
        let profile = MobilityProfile::new(-0.01, 4.0, 500.0);
        // Inside holdoff the linear term exceeds T and is capped
        assert_eq!(profile.weight(0, 100, false), 4.0);
        assert!((profile.weight(0, 700, false) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_deep_scan_forces_threshold() {
        let profile = MobilityProfile::default();
        assert_eq!(profile.weight(0, 1_000_000, true), 6.0);
    }

    #[test]
    fn test_deserialize_computes_intercept() {
        let profile: MobilityProfile =
            toml::from_str("slope = -0.005\nthreshold = 3.0\nholdoff = 200.0").unwrap();
        assert!((profile.intercept() - 4.0).abs() < 1e-9);
        assert!(profile.is_valid());
    }
}
