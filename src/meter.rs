//! Meter state owned by the poll-completion handler.
//!
//! All mutable pipeline state (hold memory, SWR latches, link status) lives
//! in one [`MeterState`]. The poller guards it with a single mutex, so poll
//! completions and user actions are applied one at a time and in order.

use serde_json::Value;

use crate::data::{
    swr_valid, EffectiveSnapshot, HoldLatchEngine, LinkState, MeterView, ResetTarget, SwrLatch,
};
use crate::error::PollError;
use crate::prefs::{clamp_swr_limit, clamp_threshold, Config};
use crate::source::{normalize, ChannelIndex, RawSnapshot, CHANNELS};

/// What happened to one poll result.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Snapshot decoded and applied.
    Applied,
    /// Transport or decode failure recorded; `was_connected` tells whether
    /// this failure ended a connected period.
    Failed { was_connected: bool },
    /// Result belonged to an older request or a stopped loop and was dropped.
    Discarded,
}

/// Pipeline state for one meter head.
#[derive(Debug)]
pub struct MeterState {
    config: Config,
    engine: HoldLatchEngine,
    swr: SwrLatch,
    link: LinkState,
    raw: Option<RawSnapshot>,
    effective: Option<EffectiveSnapshot>,
    display_swr: [Option<f64>; CHANNELS],
    issued: u64,
    generation: u64,
}

impl MeterState {
    pub fn new(mut config: Config) -> Self {
        config.sanitize();
        Self {
            config,
            engine: HoldLatchEngine::new(),
            swr: SwrLatch::new(),
            link: LinkState::default(),
            raw: None,
            effective: None,
            display_swr: [None; CHANNELS],
            issued: 0,
            generation: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &HoldLatchEngine {
        &self.engine
    }

    pub fn swr_latch(&self) -> &SwrLatch {
        &self.swr
    }

    pub fn effective(&self) -> Option<&EffectiveSnapshot> {
        self.effective.as_ref()
    }

    pub fn display_swr(&self) -> &[Option<f64>; CHANNELS] {
        &self.display_swr
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.link.error.as_deref()
    }

    /// Sequence number of the last applied result.
    pub fn applied_sequence(&self) -> u64 {
        self.link.sequence
    }

    /// Allocate the sequence number for a new request.
    pub fn next_sequence(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Current loop generation; results tagged with an older one are dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate every request issued so far. Called on stop.
    pub fn end_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Apply the result of request `sequence` issued under `generation`.
    ///
    /// Results older than the last applied one are discarded so a slow
    /// response can never overwrite fresher state.
    pub fn apply(
        &mut self,
        generation: u64,
        sequence: u64,
        result: Result<Value, PollError>,
    ) -> PollOutcome {
        if generation != self.generation || sequence <= self.link.sequence {
            return PollOutcome::Discarded;
        }
        self.link.sequence = sequence;

        match result {
            Ok(payload) => {
                self.ingest(normalize(&payload));
                self.link.connected = true;
                self.link.error = None;
                PollOutcome::Applied
            }
            Err(e) => {
                let was_connected = self.link.connected;
                self.link.connected = false;
                self.link.error = Some(e.to_string());
                PollOutcome::Failed { was_connected }
            }
        }
    }

    fn ingest(&mut self, raw: RawSnapshot) {
        let hold = self.config.hold_settings();
        let effective = self.engine.apply(&raw, &hold);
        self.display_swr = self.swr.update(&effective.readings.values, hold.enabled);
        self.effective = Some(effective);
        self.raw = Some(raw);
    }

    /// Clear hold memory and SWR latch for the target channel(s).
    ///
    /// Live readings are untouched: the affected channels immediately show
    /// the most recent live values again.
    pub fn reset(&mut self, target: ResetTarget) {
        self.engine.reset(target);
        self.swr.reset(target);

        for channel in ChannelIndex::ALL {
            if target.includes(channel) {
                self.restore_live(channel);
            }
        }
    }

    fn restore_live(&mut self, channel: ChannelIndex) {
        let i = channel.get();
        if let (Some(raw), Some(effective)) = (&self.raw, &mut self.effective) {
            effective.restore_live(raw, channel);
            let live = &raw.values;
            self.display_swr[i] = swr_valid(live.avg_watts[i], live.swr[i]).then_some(live.swr[i]);
        } else {
            self.display_swr[i] = None;
        }
    }

    /// Turn hold on or off. Turning it off discards all hold memory at once.
    pub fn set_hold_enabled(&mut self, enabled: bool) {
        self.config.device.hold_enabled = enabled;
        if !enabled {
            self.reset(ResetTarget::All);
        }
    }

    pub fn set_threshold(&mut self, watts: f64) {
        self.config.device.rf_threshold_watts = clamp_threshold(watts);
    }

    pub fn set_swr_limit(&mut self, limit: f64) {
        self.config.meters.swr_limit = clamp_swr_limit(limit);
    }

    pub fn set_sense_channel(&mut self, channel: ChannelIndex) {
        self.config.meters.swr_sensor = channel.get();
    }

    pub fn set_meter_name(&mut self, channel: ChannelIndex, name: &str) {
        self.config.meters.meters[channel.get()].name = name.to_string();
        self.config.sanitize();
    }

    pub fn set_meter_visible(&mut self, channel: ChannelIndex, visible: bool) {
        self.config.meters.meters[channel.get()].visible = visible;
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.config.device.base_url = base_url.to_string();
        self.config.sanitize();
    }

    pub fn set_poll_ms(&mut self, poll_ms: u64) {
        self.config.device.poll_ms = poll_ms;
        self.config.sanitize();
    }

    /// Build the view for subscribers.
    pub fn view(&self) -> MeterView {
        MeterView::build(
            self.effective.as_ref(),
            &self.display_swr,
            &self.link,
            &self.config,
        )
    }
}
