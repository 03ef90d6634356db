//! Per-channel peak hold.
//!
//! Each channel runs an independent three-phase machine:
//!
//! ```text
//!            activity              activity lost
//! Inactive ───────────▶ Active ─────────────────▶ Latched
//!    ▲                    ▲                          │
//!    │ reset              └──────────────────────────┘
//!    │                         activity returns
//! ```
//!
//! While active the hold buffers track the live readings (average is last
//! value, peak is running max). When activity drops the buffers freeze and
//! the channel's effective reading becomes the frozen buffer until activity
//! returns or the channel is reset.

use serde::Serialize;

use crate::source::{ChannelIndex, MeterValues, RawSnapshot, CHANNELS, SENTINEL};

/// Inputs the engine needs from the current configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldSettings {
    pub enabled: bool,
    /// Average power at or above which a channel counts as transmitting.
    pub threshold_watts: f64,
    /// Channel whose activity gates every other channel.
    pub sense: ChannelIndex,
}

impl Default for HoldSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_watts: 1.0,
            sense: ChannelIndex::default(),
        }
    }
}

/// Which channels a reset applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Channel(ChannelIndex),
    All,
}

impl ResetTarget {
    /// Whether `channel` is covered by this target.
    pub fn includes(self, channel: ChannelIndex) -> bool {
        match self {
            ResetTarget::All => true,
            ResetTarget::Channel(c) => c == channel,
        }
    }
}

/// Phase of a channel's hold machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldPhase {
    Inactive,
    Active,
    Latched,
}

/// Hold memory for a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldState {
    pub active: bool,
    pub latched: bool,
    pub avg_watts: f64,
    pub peak_watts: f64,
    pub rfd_avg_watts: f64,
    pub rfd_peak_watts: f64,
}

impl Default for HoldState {
    fn default() -> Self {
        Self {
            active: false,
            latched: false,
            avg_watts: SENTINEL,
            peak_watts: SENTINEL,
            rfd_avg_watts: SENTINEL,
            rfd_peak_watts: SENTINEL,
        }
    }
}

impl HoldState {
    pub fn phase(&self) -> HoldPhase {
        if self.latched {
            HoldPhase::Latched
        } else if self.active {
            HoldPhase::Active
        } else {
            HoldPhase::Inactive
        }
    }

    fn begin_cycle(&mut self) {
        *self = Self::default();
    }

    fn accumulate(&mut self, values: &MeterValues, channel: ChannelIndex) {
        let i = channel.get();
        self.avg_watts = values.avg_watts[i];
        self.peak_watts = self.peak_watts.max(values.peak_watts[i]);
        if let Some(avg) = values.rfd_avg_watts.get(channel) {
            self.rfd_avg_watts = avg;
        }
        if let Some(peak) = values.rfd_peak_watts.get(channel) {
            self.rfd_peak_watts = self.rfd_peak_watts.max(peak);
        }
    }

    fn overlay(&self, values: &mut MeterValues, channel: ChannelIndex) {
        let i = channel.get();
        values.avg_watts[i] = self.avg_watts;
        values.peak_watts[i] = self.peak_watts;
        if self.rfd_avg_watts >= 0.0 {
            values.rfd_avg_watts.set(channel, self.rfd_avg_watts);
        }
        if self.rfd_peak_watts >= 0.0 {
            values.rfd_peak_watts.set(channel, self.rfd_peak_watts);
        }
    }
}

/// Whether `channel` counts as transmitting.
///
/// The sense channel decides for itself from its own average power. Every
/// other channel additionally requires the sense channel to be active, since
/// all couplers sit on one RF path fed through the sense channel.
pub fn is_active(
    values: &MeterValues,
    channel: ChannelIndex,
    threshold_watts: f64,
    sense: ChannelIndex,
) -> bool {
    let own = values.avg_watts[channel.get()] >= threshold_watts;
    if channel == sense {
        return own;
    }
    own && values.avg_watts[sense.get()] >= threshold_watts
}

/// A snapshot after hold has been applied: latched channels carry their
/// held readings instead of the live ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSnapshot {
    pub readings: RawSnapshot,
    pub hold: [HoldState; CHANNELS],
}

impl EffectiveSnapshot {
    /// Wrap a live snapshot with no hold in effect.
    pub fn live(raw: RawSnapshot) -> Self {
        Self {
            readings: raw,
            hold: [HoldState::default(); CHANNELS],
        }
    }

    pub fn is_latched(&self, channel: ChannelIndex) -> bool {
        self.hold[channel.get()].latched
    }

    /// Put the live readings back on `channel` and forget its hold state.
    pub fn restore_live(&mut self, raw: &RawSnapshot, channel: ChannelIndex) {
        let i = channel.get();
        let live = &raw.values;
        let values = &mut self.readings.values;
        values.avg_watts[i] = live.avg_watts[i];
        values.peak_watts[i] = live.peak_watts[i];
        values
            .rfd_avg_watts
            .set_entry(channel, live.rfd_avg_watts.get(channel));
        values
            .rfd_peak_watts
            .set_entry(channel, live.rfd_peak_watts.get(channel));
        self.hold[i] = HoldState::default();
    }
}

/// Hold memory for all four channels.
#[derive(Debug, Clone, Default)]
pub struct HoldLatchEngine {
    channels: [HoldState; CHANNELS],
}

impl HoldLatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold memory for one channel.
    pub fn state(&self, channel: ChannelIndex) -> &HoldState {
        &self.channels[channel.get()]
    }

    /// Run one poll's worth of transitions and produce the effective snapshot.
    ///
    /// With hold disabled all memory is discarded and the live snapshot is
    /// returned unchanged.
    pub fn apply(&mut self, raw: &RawSnapshot, settings: &HoldSettings) -> EffectiveSnapshot {
        if !settings.enabled {
            self.clear();
            return EffectiveSnapshot::live(raw.clone());
        }

        let mut effective = raw.clone();

        for channel in ChannelIndex::ALL {
            let active = is_active(
                &raw.values,
                channel,
                settings.threshold_watts,
                settings.sense,
            );
            let state = &mut self.channels[channel.get()];

            if active && (!state.active || state.latched) {
                state.begin_cycle();
            }

            if active {
                state.accumulate(&raw.values, channel);
            } else if state.active {
                state.latched = true;
            }

            state.active = active;

            if state.latched {
                state.overlay(&mut effective.values, channel);
            }
        }

        EffectiveSnapshot {
            readings: effective,
            hold: self.channels,
        }
    }

    /// Clear hold memory for the target channel(s). Live readings are not
    /// touched; the next poll starts from a clean slate.
    pub fn reset(&mut self, target: ResetTarget) {
        for channel in ChannelIndex::ALL {
            if target.includes(channel) {
                self.channels[channel.get()] = HoldState::default();
            }
        }
    }

    /// Discard all hold memory.
    pub fn clear(&mut self) {
        self.reset(ResetTarget::All);
    }
}
