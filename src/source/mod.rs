//! Status sources and snapshot normalization.
//!
//! A [`StatusSource`] fetches one raw status document; [`normalize`] turns
//! it into a fixed four-channel [`RawSnapshot`]. The poller only depends on
//! the trait, so tests can script responses without a live bridge.

mod channel;
mod http;
mod snapshot;

pub use channel::Subscription;
pub use http::{status_url, HttpSource, HttpSourceBuilder, STATUS_PATH};
pub use snapshot::{
    normalize, ChannelIndex, MeterValues, RawSnapshot, Reflected, CHANNELS, SENTINEL,
};

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PollError;

/// Something that can fetch a WaveNode status document.
///
/// # Example
///
/// ```no_run
/// use wavenode_watch::{HttpSource, StatusSource};
/// use wavenode_watch::source::{normalize, status_url};
///
/// # tokio_test::block_on(async {
/// let source = HttpSource::builder().build()?;
/// let payload = source.fetch(&status_url("http://localhost:8787")).await?;
/// let snapshot = normalize(&payload);
/// println!("FWD {:?}", snapshot.values.avg_watts);
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// # });
/// ```
#[async_trait]
pub trait StatusSource: Send + Sync + Debug {
    /// Fetch and decode one status document from `url`.
    ///
    /// Only transport and decoding fail here; the document's shape is
    /// handled by [`normalize`].
    async fn fetch(&self, url: &str) -> Result<Value, PollError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}
