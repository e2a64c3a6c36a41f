//! Anti-clustering post-processing for raw evaluator scores.
//!
//! Evaluators drift toward a comfortable 70-85 for anything unremarkable.
//! Scores inside that band are pushed outward: the lower half down, the upper
//! half up. Scores outside the band pass through untouched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscriminantCurve {
    /// Inclusive lower edge of the uninformative band.
    pub band_low: u8,
    /// Inclusive upper edge.
    pub band_high: u8,
    /// Points moved outward for in-band scores.
    pub push: u8,
}

impl Default for DiscriminantCurve {
    fn default() -> Self {
        Self {
            band_low: 70,
            band_high: 85,
            push: 5,
        }
    }
}

impl DiscriminantCurve {
    /// Pure and monotonic within each half-band. Result stays in 0..=100.
    pub fn apply(&self, raw: u8) -> u8 {
        let raw = raw.min(100);
        if raw < self.band_low || raw > self.band_high {
            return raw;
        }
        let doubled = u16::from(raw) * 2;
        let midpoint_doubled = u16::from(self.band_low) + u16::from(self.band_high);
        if doubled < midpoint_doubled {
            raw.saturating_sub(self.push)
        } else {
            raw.saturating_add(self.push).min(100)
        }
    }
}

/// [`DiscriminantCurve::apply`] with the default 70-85 band.
pub fn apply_discriminant_curve(raw: u8) -> u8 {
    DiscriminantCurve::default().apply(raw)
}
