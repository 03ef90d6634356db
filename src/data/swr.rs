//! SWR display latch.
//!
//! Independent of the peak hold: each channel captures the highest SWR seen
//! while the reading is valid, and keeps showing it after the transmitter
//! unkeys until the next valid cycle begins.

use crate::source::{ChannelIndex, MeterValues, CHANNELS};

use super::hold::ResetTarget;

/// Forward power below which the coupler's SWR reading is meaningless.
pub const SWR_MIN_FORWARD_WATTS: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SwrChannel {
    was_valid: bool,
    captured: Option<f64>,
}

/// Captured maximum SWR for all four channels.
#[derive(Debug, Clone, Default)]
pub struct SwrLatch {
    channels: [SwrChannel; CHANNELS],
}

/// A reading is valid when there is enough forward power and the SWR is a
/// physically possible ratio.
pub fn swr_valid(forward_watts: f64, swr: f64) -> bool {
    forward_watts.is_finite()
        && forward_watts >= SWR_MIN_FORWARD_WATTS
        && swr.is_finite()
        && swr >= 1.0
}

impl SwrLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured maximum for a channel, if any.
    pub fn captured(&self, channel: ChannelIndex) -> Option<f64> {
        self.channels[channel.get()].captured
    }

    /// Feed one effective snapshot and return the SWR to display per channel.
    ///
    /// With the latch off the instantaneous SWR is shown while valid and
    /// nothing otherwise.
    pub fn update(&mut self, values: &MeterValues, enabled: bool) -> [Option<f64>; CHANNELS] {
        let mut shown = [None; CHANNELS];

        for channel in ChannelIndex::ALL {
            let i = channel.get();
            let swr = values.swr[i];
            let valid = swr_valid(values.avg_watts[i], swr);
            let slot = &mut self.channels[i];
            let started = valid && !slot.was_valid;
            slot.was_valid = valid;

            if !enabled {
                slot.captured = None;
                shown[i] = valid.then_some(swr);
                continue;
            }

            if started {
                slot.captured = Some(swr);
            } else if valid {
                slot.captured = Some(slot.captured.map_or(swr, |c| c.max(swr)));
            }
            shown[i] = slot.captured;
        }

        shown
    }

    pub fn reset(&mut self, target: ResetTarget) {
        match target {
            ResetTarget::All => self.channels = Default::default(),
            ResetTarget::Channel(c) => self.channels[c.get()] = SwrChannel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SENTINEL;

    fn values(fwd: f64, swr: f64) -> MeterValues {
        let mut v = MeterValues::default();
        v.avg_watts = [fwd; CHANNELS];
        v.swr = [swr; CHANNELS];
        v
    }

    #[test]
    fn test_validity_rules() {
        assert!(swr_valid(2.0, 1.0));
        assert!(!swr_valid(1.9, 1.5));
        assert!(!swr_valid(50.0, 0.9));
        assert!(!swr_valid(50.0, SENTINEL));
        assert!(!swr_valid(f64::NAN, 1.5));
        assert!(!swr_valid(50.0, f64::INFINITY));
    }

    #[test]
    fn test_captures_max_and_holds_after_unkey() {
        let mut latch = SwrLatch::new();
        assert_eq!(latch.update(&values(0.0, SENTINEL), true)[0], None);
        assert_eq!(latch.update(&values(50.0, 1.4), true)[0], Some(1.4));
        assert_eq!(latch.update(&values(50.0, 1.9), true)[0], Some(1.9));
        assert_eq!(latch.update(&values(50.0, 1.6), true)[0], Some(1.9));
        assert_eq!(latch.update(&values(0.0, SENTINEL), true)[0], Some(1.9));
        assert_eq!(latch.update(&values(0.0, SENTINEL), true)[0], Some(1.9));
    }

    #[test]
    fn test_new_cycle_resets_to_current() {
        let mut latch = SwrLatch::new();
        latch.update(&values(50.0, 2.8), true);
        latch.update(&values(0.0, SENTINEL), true);
        assert_eq!(latch.update(&values(30.0, 1.2), true)[0], Some(1.2));
    }

    #[test]
    fn test_disabled_shows_instantaneous() {
        let mut latch = SwrLatch::new();
        assert_eq!(latch.update(&values(50.0, 2.0), false)[0], Some(2.0));
        assert_eq!(latch.update(&values(50.0, 1.5), false)[0], Some(1.5));
        assert_eq!(latch.update(&values(0.0, SENTINEL), false)[0], None);
        assert!(latch.captured(ChannelIndex::ALL[0]).is_none());
    }

    #[test]
    fn test_enable_mid_transmission_captures() {
        let mut latch = SwrLatch::new();
        latch.update(&values(50.0, 1.5), false);
        // Still the same carrier, so not a new cycle; the current reading
        // seeds the capture.
        assert_eq!(latch.update(&values(50.0, 1.3), true)[0], Some(1.3));
    }

    #[test]
    fn test_reset_single_channel() {
        let mut latch = SwrLatch::new();
        latch.update(&values(50.0, 2.2), true);
        latch.reset(ResetTarget::Channel(ChannelIndex::ALL[1]));

        assert_eq!(latch.captured(ChannelIndex::ALL[0]), Some(2.2));
        assert_eq!(latch.captured(ChannelIndex::ALL[1]), None);

        // After a reset the next valid reading starts a fresh cycle.
        let shown = latch.update(&values(50.0, 1.1), true);
        assert_eq!(shown[1], Some(1.1));
        assert_eq!(shown[0], Some(2.2));
    }
}
