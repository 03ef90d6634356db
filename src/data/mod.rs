//! Hold, latch and derived metrics for normalized snapshots.
//!
//! ## Submodules
//!
//! - [`hold`]: Per-channel peak hold state machine ([`HoldLatchEngine`])
//! - [`swr`]: SWR display latch ([`SwrLatch`])
//! - [`metrics`]: Worst-case SWR, totals and tone ([`DerivedMetrics`])
//! - [`view`]: The display-ready [`MeterView`] published to subscribers
//!
//! ## Data Flow
//!
//! ```text
//! RawSnapshot (normalized JSON)
//!        │
//!        ▼
//! HoldLatchEngine::apply()
//!        │
//!        ▼
//! EffectiveSnapshot ──▶ SwrLatch::update()
//!        │                     │
//!        ▼                     ▼
//! DerivedMetrics::compute() ──▶ MeterView::build()
//! ```

pub mod hold;
pub mod metrics;
pub mod swr;
pub mod view;

pub use hold::{
    is_active, EffectiveSnapshot, HoldLatchEngine, HoldPhase, HoldSettings, HoldState,
    ResetTarget,
};
pub use metrics::{display_watts, format_watts, swr_label, DerivedMetrics, Tone, Totals};
pub use swr::{swr_valid, SwrLatch, SWR_MIN_FORWARD_WATTS};
pub use view::{ChannelView, LinkState, LinkStatus, MeterView};
