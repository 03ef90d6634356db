//! # wavenode-watch
//!
//! Telemetry acquisition and peak-hold engine for WaveNode RF power/SWR
//! meters exposed through a local HTTP bridge.
//!
//! The crate polls the bridge's status endpoint, folds whatever it returns
//! into a fixed four-channel record, holds peak and average readings across
//! gaps between transmissions, and derives the cross-channel figures a
//! station display or alarm needs: worst-case SWR, power totals and a tone
//! classification against a configurable SWR limit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Poller                            │
//! │  ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐  │
//! │  │  source  │──▶│ normalize │──▶│   data   │──▶│ MeterView│──┼──▶ Subscription
//! │  │  (HTTP)  │   │ (4 chans) │   │(hold/SWR)│   │          │  │
//! │  └──────────┘   └───────────┘   └──────────┘   └──────────┘  │
//! │        ▲                              ▲                      │
//! │        └────────── prefs (Config, PrefsStore) ───────────────┘
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: The [`StatusSource`] trait, the reqwest-backed
//!   [`HttpSource`], payload normalization into [`RawSnapshot`], and the
//!   subscriber side of the view channel
//! - **[`data`]**: The hold state machine, SWR display latch, derived metrics
//!   and the published [`MeterView`]
//! - **[`meter`]**: [`MeterState`], the single owner of all mutable pipeline state
//! - **[`poller`]**: [`Poller`], the fixed-delay scheduler with `start`, `stop`
//!   and `subscribe`
//! - **[`prefs`]**: Persisted user preferences behind the [`PrefsStore`] trait
//!
//! ## Usage
//!
//! ### Following a live bridge
//!
//! ```no_run
//! use std::sync::Arc;
//! use wavenode_watch::{HttpSource, MemoryStore, Poller};
//!
//! # tokio_test::block_on(async {
//! let source = Arc::new(HttpSource::builder().build().unwrap());
//! let mut poller = Poller::new(source, Arc::new(MemoryStore::new()));
//! poller.set_hold_enabled(true).unwrap();
//!
//! let mut views = poller.subscribe();
//! poller.start();
//! if let Some(view) = views.changed().await {
//!     for channel in view.visible_channels() {
//!         println!("{}: {} W, SWR {}", channel.name, channel.avg_watts, channel.swr_label);
//!     }
//! }
//! poller.stop();
//! # });
//! ```
//!
//! ### Driving the hold engine directly
//!
//! ```
//! use serde_json::json;
//! use wavenode_watch::{normalize, HoldLatchEngine, HoldSettings};
//!
//! let mut engine = HoldLatchEngine::new();
//! let settings = HoldSettings { enabled: true, ..HoldSettings::default() };
//!
//! let keyed = normalize(&json!({"values": {"avgWatts": [100, 0, 0, 0], "peakWatts": [140, 0, 0, 0]}}));
//! let unkeyed = normalize(&json!({"values": {"avgWatts": [0, 0, 0, 0], "peakWatts": [0, 0, 0, 0]}}));
//!
//! engine.apply(&keyed, &settings);
//! let effective = engine.apply(&unkeyed, &settings);
//! assert_eq!(effective.readings.values.peak_watts[0], 140.0);
//! ```

pub mod data;
pub mod error;
pub mod meter;
pub mod poller;
pub mod prefs;
pub mod source;

// Re-export main types for convenience
pub use data::{
    ChannelView, DerivedMetrics, EffectiveSnapshot, HoldLatchEngine, HoldPhase, HoldSettings,
    HoldState, LinkStatus, MeterView, ResetTarget, SwrLatch, Tone, Totals,
};
pub use error::{PollError, StoreError};
pub use meter::{MeterState, PollOutcome};
pub use poller::Poller;
pub use prefs::{Config, DevicePrefs, FileStore, MemoryStore, MeterPrefs, PrefsStore};
pub use source::{
    normalize, ChannelIndex, HttpSource, MeterValues, RawSnapshot, Reflected, StatusSource,
    Subscription,
};
