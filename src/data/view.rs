//! Display-ready view published to subscribers after every poll.

use serde::Serialize;

use super::hold::{EffectiveSnapshot, HoldPhase};
use super::metrics::{display_watts, swr_label, DerivedMetrics, Tone, Totals};
use crate::prefs::Config;
use crate::source::{ChannelIndex, CHANNELS, SENTINEL};

/// Overall link indicator, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// No data received yet.
    Waiting,
    Live,
    Stale,
    /// The meter head tripped its SWR protection.
    SwrTrip,
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Waiting => "WAIT",
            LinkStatus::Live => "LIVE",
            LinkStatus::Stale => "STALE",
            LinkStatus::SwrTrip => "SWR TRIP",
        }
    }
}

/// One meter channel as it should be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelView {
    pub index: ChannelIndex,
    pub name: String,
    pub visible: bool,
    /// Effective average (held while latched), sentinel when unknown.
    pub avg_watts: f64,
    pub peak_watts: f64,
    /// Meter-face values; readings under 2 W show as zero.
    pub display_avg_watts: f64,
    pub display_peak_watts: f64,
    pub rfd_avg_watts: Option<f64>,
    pub rfd_peak_watts: Option<f64>,
    /// Instantaneous SWR, sentinel when unknown.
    pub swr: f64,
    /// SWR after the display latch.
    pub display_swr: Option<f64>,
    pub swr_label: String,
    pub tone: Tone,
    pub hold: HoldPhase,
}

/// Everything a consumer needs to render the meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterView {
    /// Sequence number of the poll that produced the readings, 0 before any.
    pub sequence: u64,
    pub connected: bool,
    pub error: Option<String>,
    pub stale: bool,
    pub status: LinkStatus,
    pub swr_tripped: bool,
    pub last_seen_utc: Option<String>,
    pub dc_volts: f64,
    pub dc_amps: f64,
    pub aux: [f64; CHANNELS],
    pub worst_swr: Option<f64>,
    pub worst_tone: Tone,
    pub totals: Totals,
    pub has_reflected: bool,
    pub channels: Vec<ChannelView>,
}

impl Default for MeterView {
    fn default() -> Self {
        Self {
            sequence: 0,
            connected: false,
            error: None,
            stale: true,
            status: LinkStatus::Waiting,
            swr_tripped: false,
            last_seen_utc: None,
            dc_volts: SENTINEL,
            dc_amps: SENTINEL,
            aux: [SENTINEL; CHANNELS],
            worst_swr: None,
            worst_tone: Tone::Muted,
            totals: Totals::default(),
            has_reflected: false,
            channels: Vec::new(),
        }
    }
}

/// Link-level facts that do not come from the snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    pub sequence: u64,
    pub connected: bool,
    pub error: Option<String>,
}

impl MeterView {
    /// Assemble a view from the latest effective snapshot.
    ///
    /// `effective` is `None` until the first successful poll.
    pub fn build(
        effective: Option<&EffectiveSnapshot>,
        display_swr: &[Option<f64>; CHANNELS],
        link: &LinkState,
        config: &Config,
    ) -> Self {
        let Some(effective) = effective else {
            return Self {
                sequence: link.sequence,
                connected: link.connected,
                error: link.error.clone(),
                channels: Self::empty_channels(config),
                ..Self::default()
            };
        };

        let readings = &effective.readings;
        let values = &readings.values;
        let hold = config.hold_settings();
        let limit = config.swr_limit();
        let metrics = DerivedMetrics::compute(values, hold.threshold_watts, hold.sense, limit);

        let stale = readings.stale || !link.connected;
        let status = if values.swr_tripped {
            LinkStatus::SwrTrip
        } else if stale {
            LinkStatus::Stale
        } else {
            LinkStatus::Live
        };

        let channels = ChannelIndex::ALL
            .into_iter()
            .map(|c| {
                let i = c.get();
                let slot = config.meters.slot(c);
                let shown = display_swr[i];
                ChannelView {
                    index: c,
                    name: slot.name.clone(),
                    visible: slot.visible,
                    avg_watts: values.avg_watts[i],
                    peak_watts: values.peak_watts[i],
                    display_avg_watts: display_watts(values.avg_watts[i]),
                    display_peak_watts: display_watts(values.peak_watts[i]),
                    rfd_avg_watts: values.rfd_avg_watts.get(c),
                    rfd_peak_watts: values.rfd_peak_watts.get(c),
                    swr: values.swr[i],
                    display_swr: shown,
                    swr_label: swr_label(shown),
                    tone: Tone::classify(shown, limit),
                    hold: effective.hold[i].phase(),
                }
            })
            .collect();

        Self {
            sequence: link.sequence,
            connected: link.connected,
            error: link.error.clone(),
            stale,
            status,
            swr_tripped: values.swr_tripped,
            last_seen_utc: readings.last_seen_utc.clone(),
            dc_volts: values.dc_volts,
            dc_amps: values.dc_amps,
            aux: values.aux,
            worst_swr: metrics.worst_swr,
            worst_tone: metrics.worst_tone,
            totals: metrics.totals,
            has_reflected: metrics.has_reflected,
            channels,
        }
    }

    fn empty_channels(config: &Config) -> Vec<ChannelView> {
        ChannelIndex::ALL
            .into_iter()
            .map(|c| {
                let slot = config.meters.slot(c);
                ChannelView {
                    index: c,
                    name: slot.name.clone(),
                    visible: slot.visible,
                    avg_watts: SENTINEL,
                    peak_watts: SENTINEL,
                    display_avg_watts: 0.0,
                    display_peak_watts: 0.0,
                    rfd_avg_watts: None,
                    rfd_peak_watts: None,
                    swr: SENTINEL,
                    display_swr: None,
                    swr_label: swr_label(None),
                    tone: Tone::Muted,
                    hold: HoldPhase::Inactive,
                }
            })
            .collect()
    }

    /// Channels the user chose to show, in order.
    pub fn visible_channels(&self) -> impl Iterator<Item = &ChannelView> {
        self.channels.iter().filter(|c| c.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawSnapshot;

    fn config() -> Config {
        let mut config = Config::default();
        config.sanitize();
        config
    }

    fn connected() -> LinkState {
        LinkState {
            sequence: 3,
            connected: true,
            error: None,
        }
    }

    #[test]
    fn test_view_before_first_poll() {
        let view = MeterView::build(None, &[None; CHANNELS], &LinkState::default(), &config());
        assert_eq!(view.status, LinkStatus::Waiting);
        assert!(view.stale);
        assert_eq!(view.channels.len(), CHANNELS);
        assert_eq!(view.channels[0].name, "Meter 1");
        assert_eq!(view.channels[0].swr_label, "—");
    }

    #[test]
    fn test_status_priority() {
        let mut raw = RawSnapshot::default();
        let eff = EffectiveSnapshot::live(raw.clone());
        let view = MeterView::build(Some(&eff), &[None; CHANNELS], &connected(), &config());
        assert_eq!(view.status, LinkStatus::Live);

        raw.stale = true;
        let eff = EffectiveSnapshot::live(raw.clone());
        let view = MeterView::build(Some(&eff), &[None; CHANNELS], &connected(), &config());
        assert_eq!(view.status, LinkStatus::Stale);

        raw.values.swr_tripped = true;
        let eff = EffectiveSnapshot::live(raw);
        let view = MeterView::build(Some(&eff), &[None; CHANNELS], &connected(), &config());
        assert_eq!(view.status, LinkStatus::SwrTrip);
    }

    #[test]
    fn test_disconnected_is_stale() {
        let eff = EffectiveSnapshot::live(RawSnapshot::default());
        let link = LinkState {
            sequence: 4,
            connected: false,
            error: Some("HTTP 502".into()),
        };
        let view = MeterView::build(Some(&eff), &[None; CHANNELS], &link, &config());
        assert!(view.stale);
        assert_eq!(view.error.as_deref(), Some("HTTP 502"));
    }

    #[test]
    fn test_channel_display_values() {
        let mut raw = RawSnapshot::default();
        raw.values.avg_watts = [100.0, 1.5, 0.0, SENTINEL];
        raw.values.swr = [1.2, 1.0, 1.0, SENTINEL];
        let eff = EffectiveSnapshot::live(raw);

        let mut cfg = config();
        cfg.meters.meters[3].visible = false;
        let shown = [Some(3.4), None, None, None];

        let view = MeterView::build(Some(&eff), &shown, &connected(), &cfg);
        assert_eq!(view.channels[0].display_avg_watts, 100.0);
        assert_eq!(view.channels[1].display_avg_watts, 0.0);
        assert_eq!(view.channels[0].swr_label, "3.40");
        assert_eq!(view.channels[0].tone, Tone::Bad);
        assert_eq!(view.channels[1].tone, Tone::Muted);
        assert_eq!(view.worst_swr, Some(1.2));
        assert_eq!(view.totals.avg_watts, 101.5);
        assert_eq!(view.visible_channels().count(), 3);
    }
}
