//! Status payload normalization.
//!
//! The bridge answers `GET /api/wavenode/status` with a JSON document whose
//! fields may be missing, wrong-typed or sized for a different meter head.
//! [`normalize`] folds any such document into a fixed four-channel
//! [`RawSnapshot`] with explicit sentinels, and never fails.

use serde::Serialize;
use serde_json::Value;

/// Number of meter channels on a WaveNode head.
pub const CHANNELS: usize = 4;

/// Value stored for a numeric field that was absent or not a number.
///
/// Distinct from `0.0`, which is a valid reading.
pub const SENTINEL: f64 = -1.0;

/// Index of one of the four meter channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelIndex(usize);

impl ChannelIndex {
    /// Every channel, in order.
    pub const ALL: [ChannelIndex; CHANNELS] =
        [ChannelIndex(0), ChannelIndex(1), ChannelIndex(2), ChannelIndex(3)];

    /// Returns `None` for indices outside `0..4`.
    pub fn new(index: usize) -> Option<Self> {
        (index < CHANNELS).then_some(Self(index))
    }

    /// Clamp an arbitrary index into `0..4`.
    pub fn clamped(index: i64) -> Self {
        Self(index.clamp(0, CHANNELS as i64 - 1) as usize)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ChannelIndex {
    fn default() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reflected power for all four channels.
///
/// Older bridges do not report reflected power at all, which is a different
/// situation from a bridge that reports an invalid entry for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reflected {
    /// The payload carried no array for this field.
    Unsupported,
    /// The payload carried an array; `None` marks a non-numeric entry.
    Reported([Option<f64>; CHANNELS]),
}

impl Reflected {
    pub fn is_supported(&self) -> bool {
        matches!(self, Reflected::Reported(_))
    }

    /// Reading for a channel, if the backend reported a number for it.
    pub fn get(&self, channel: ChannelIndex) -> Option<f64> {
        match self {
            Reflected::Unsupported => None,
            Reflected::Reported(values) => values[channel.get()],
        }
    }

    /// Overwrite one channel. Has no effect when unsupported.
    pub fn set(&mut self, channel: ChannelIndex, value: f64) {
        self.set_entry(channel, Some(value));
    }

    /// Overwrite one channel's entry, including clearing it to `None`.
    pub fn set_entry(&mut self, channel: ChannelIndex, value: Option<f64>) {
        if let Reflected::Reported(values) = self {
            values[channel.get()] = value;
        }
    }
}

/// Per-channel readings and head-wide scalars from one status response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterValues {
    pub avg_watts: [f64; CHANNELS],
    pub peak_watts: [f64; CHANNELS],
    pub swr: [f64; CHANNELS],
    pub dc_volts: f64,
    pub dc_amps: f64,
    pub aux: [f64; CHANNELS],
    pub swr_tripped: bool,
    pub rfd_avg_watts: Reflected,
    pub rfd_peak_watts: Reflected,
}

impl Default for MeterValues {
    fn default() -> Self {
        Self {
            avg_watts: [SENTINEL; CHANNELS],
            peak_watts: [SENTINEL; CHANNELS],
            swr: [SENTINEL; CHANNELS],
            dc_volts: SENTINEL,
            dc_amps: SENTINEL,
            aux: [SENTINEL; CHANNELS],
            swr_tripped: false,
            rfd_avg_watts: Reflected::Unsupported,
            rfd_peak_watts: Reflected::Unsupported,
        }
    }
}

/// A normalized status response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawSnapshot {
    /// Bridge-side timestamp of the last USB frame, verbatim.
    pub last_seen_utc: Option<String>,
    /// Bridge reports that the meter head stopped sending frames.
    pub stale: bool,
    pub values: MeterValues,
}

/// Normalize an arbitrary status payload.
///
/// Numeric fields that are absent or not numbers become [`SENTINEL`],
/// booleans default to `false`, and arrays are padded or truncated to
/// exactly four entries.
pub fn normalize(payload: &Value) -> RawSnapshot {
    let values = payload.get("values").unwrap_or(&Value::Null);

    RawSnapshot {
        last_seen_utc: payload
            .get("lastSeenUtc")
            .and_then(Value::as_str)
            .map(str::to_string),
        stale: flag(payload.get("stale")),
        values: MeterValues {
            avg_watts: norm4(values.get("avgWatts")),
            peak_watts: norm4(values.get("peakWatts")),
            swr: norm4(values.get("swr")),
            dc_volts: number(values.get("dcVolts")),
            dc_amps: number(values.get("dcAmps")),
            aux: norm4(values.get("aux")),
            swr_tripped: flag(values.get("swrTripped")),
            rfd_avg_watts: reflected(values.get("rfdAvgWatts")),
            rfd_peak_watts: reflected(values.get("rfdPeakWatts")),
        },
    }
}

fn number(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(SENTINEL)
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn norm4(value: Option<&Value>) -> [f64; CHANNELS] {
    let mut out = [SENTINEL; CHANNELS];
    if let Some(items) = value.and_then(Value::as_array) {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_f64().unwrap_or(SENTINEL);
        }
    }
    out
}

fn reflected(value: Option<&Value>) -> Reflected {
    match value.and_then(Value::as_array) {
        None => Reflected::Unsupported,
        Some(items) => {
            let mut out = [None; CHANNELS];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = item.as_f64();
            }
            Reflected::Reported(out)
        }
    }
}
