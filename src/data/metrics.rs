//! Cross-channel metrics derived from an effective snapshot.

use serde::Serialize;

use super::hold::is_active;
use crate::source::{ChannelIndex, MeterValues};

/// Readings below this many watts display as zero.
pub const DISPLAY_FLOOR_WATTS: f64 = 2.0;

/// Severity classification of an SWR reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Muted,
    Good,
    Warn,
    Bad,
}

impl Tone {
    /// Classify `swr` against the alarm `limit`.
    pub fn classify(swr: Option<f64>, limit: f64) -> Self {
        let Some(swr) = swr.filter(|s| s.is_finite() && *s >= 0.0) else {
            return Tone::Muted;
        };
        if swr >= limit {
            Tone::Bad
        } else if swr >= (0.7 * limit).max(1.5) {
            Tone::Warn
        } else {
            Tone::Good
        }
    }

    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Tone::Muted => "--",
            Tone::Good => "OK",
            Tone::Warn => "WARN",
            Tone::Bad => "BAD",
        }
    }
}

/// Sum of positive average and peak readings across channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub avg_watts: f64,
    pub peak_watts: f64,
}

/// Display-ready aggregates for one effective snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// Highest SWR among active channels, `None` when none qualify.
    pub worst_swr: Option<f64>,
    pub worst_tone: Tone,
    pub totals: Totals,
    pub has_reflected: bool,
}

impl DerivedMetrics {
    pub fn compute(
        values: &MeterValues,
        threshold_watts: f64,
        sense: ChannelIndex,
        swr_limit: f64,
    ) -> Self {
        let worst_swr = Self::worst_swr(values, threshold_watts, sense);
        Self {
            worst_swr,
            worst_tone: Tone::classify(worst_swr, swr_limit),
            totals: Self::totals(values),
            has_reflected: values.rfd_avg_watts.is_supported()
                || values.rfd_peak_watts.is_supported(),
        }
    }

    /// Highest finite, non-negative SWR among channels that are active under
    /// the sense-gated predicate.
    pub fn worst_swr(
        values: &MeterValues,
        threshold_watts: f64,
        sense: ChannelIndex,
    ) -> Option<f64> {
        ChannelIndex::ALL
            .into_iter()
            .filter(|&c| is_active(values, c, threshold_watts, sense))
            .map(|c| values.swr[c.get()])
            .filter(|s| s.is_finite() && *s >= 0.0)
            .fold(None, |worst: Option<f64>, s| Some(worst.map_or(s, |w| w.max(s))))
    }

    /// Sum readings that are strictly positive; sentinels and zeros drop out.
    pub fn totals(values: &MeterValues) -> Totals {
        let positive = |xs: &[f64]| -> f64 { xs.iter().filter(|v| **v > 0.0).sum() };
        Totals {
            avg_watts: positive(values.avg_watts.as_slice()),
            peak_watts: positive(values.peak_watts.as_slice()),
        }
    }
}

/// Power as shown on a meter face: readings under the floor show as zero.
pub fn display_watts(watts: f64) -> f64 {
    if watts.is_finite() && watts >= DISPLAY_FLOOR_WATTS {
        watts
    } else {
        0.0
    }
}

/// Format a power reading with no decimals, `--` when unknown.
pub fn format_watts(watts: Option<f64>) -> String {
    match watts {
        Some(w) if w.is_finite() => format!("{:.0}", w),
        _ => "--".to_string(),
    }
}

/// Format an SWR for display.
pub fn swr_label(swr: Option<f64>) -> String {
    match swr {
        Some(s) if s.is_finite() && s >= 0.0 => {
            if s >= 99.0 {
                "99".to_string()
            } else if s < 10.0 {
                format!("{:.2}", s)
            } else {
                format!("{:.1}", s)
            }
        }
        _ => "—".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Reflected, CHANNELS, SENTINEL};

    fn ch(i: usize) -> ChannelIndex {
        ChannelIndex::new(i).unwrap()
    }

    #[test]
    fn test_tone_boundaries() {
        let limit = 3.0;
        assert_eq!(Tone::classify(Some(limit), limit), Tone::Bad);
        assert_eq!(Tone::classify(Some(0.7 * limit), limit), Tone::Warn);
        assert_eq!(Tone::classify(Some(0.7 * limit - 1e-9), limit), Tone::Good);
        assert_eq!(Tone::classify(Some(1.0), limit), Tone::Good);
    }

    #[test]
    fn test_tone_warn_floor() {
        // 0.7 * 2.0 = 1.4 is below the 1.5 floor
        assert_eq!(Tone::classify(Some(1.45), 2.0), Tone::Good);
        assert_eq!(Tone::classify(Some(1.5), 2.0), Tone::Warn);
    }

    #[test]
    fn test_tone_muted() {
        assert_eq!(Tone::classify(None, 3.0), Tone::Muted);
        assert_eq!(Tone::classify(Some(SENTINEL), 3.0), Tone::Muted);
        assert_eq!(Tone::classify(Some(f64::NAN), 3.0), Tone::Muted);
        assert_eq!(Tone::classify(Some(f64::INFINITY), 3.0), Tone::Muted);
    }

    #[test]
    fn test_worst_swr_none_when_inactive() {
        let mut v = MeterValues::default();
        v.swr = [3.0; CHANNELS];
        v.avg_watts = [0.5; CHANNELS];
        assert_eq!(DerivedMetrics::worst_swr(&v, 1.0, ch(0)), None);
    }

    #[test]
    fn test_worst_swr_among_active() {
        let mut v = MeterValues::default();
        v.avg_watts = [100.0, 80.0, 0.0, 60.0];
        v.swr = [1.3, 1.9, 9.0, SENTINEL];
        assert_eq!(DerivedMetrics::worst_swr(&v, 1.0, ch(0)), Some(1.9));
    }

    #[test]
    fn test_worst_swr_follows_sense_gate() {
        let mut v = MeterValues::default();
        v.avg_watts = [0.0, 80.0, 80.0, 0.0];
        v.swr = [1.1, 2.5, 1.7, 1.0];
        assert_eq!(DerivedMetrics::worst_swr(&v, 1.0, ch(0)), None);
        assert_eq!(DerivedMetrics::worst_swr(&v, 1.0, ch(2)), Some(2.5));
    }

    #[test]
    fn test_totals_skip_sentinels_and_zero() {
        let mut v = MeterValues::default();
        v.avg_watts = [100.0, SENTINEL, 0.0, 25.5];
        v.peak_watts = [150.0, 10.0, SENTINEL, -3.0];
        let totals = DerivedMetrics::totals(&v);
        assert_eq!(totals.avg_watts, 125.5);
        assert_eq!(totals.peak_watts, 160.0);
    }

    #[test]
    fn test_compute_reports_reflected_support() {
        let mut v = MeterValues::default();
        assert!(!DerivedMetrics::compute(&v, 1.0, ch(0), 3.0).has_reflected);
        v.rfd_peak_watts = Reflected::Reported([None; CHANNELS]);
        assert!(DerivedMetrics::compute(&v, 1.0, ch(0), 3.0).has_reflected);
    }

    #[test]
    fn test_compute_worst_tone() {
        let mut v = MeterValues::default();
        v.avg_watts = [100.0, 0.0, 0.0, 0.0];
        v.swr = [3.2, SENTINEL, SENTINEL, SENTINEL];
        let m = DerivedMetrics::compute(&v, 1.0, ch(0), 3.0);
        assert_eq!(m.worst_swr, Some(3.2));
        assert_eq!(m.worst_tone, Tone::Bad);
    }

    #[test]
    fn test_labels() {
        assert_eq!(swr_label(None), "—");
        assert_eq!(swr_label(Some(SENTINEL)), "—");
        assert_eq!(swr_label(Some(1.234)), "1.23");
        assert_eq!(swr_label(Some(12.34)), "12.3");
        assert_eq!(swr_label(Some(150.0)), "99");
        assert_eq!(format_watts(Some(99.6)), "100");
        assert_eq!(format_watts(None), "--");
        assert_eq!(display_watts(1.9), 0.0);
        assert_eq!(display_watts(2.0), 2.0);
        assert_eq!(display_watts(SENTINEL), 0.0);
    }
}
