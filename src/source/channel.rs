//! Subscriber side of the published meter view.
//!
//! The poller is the single producer; any number of [`Subscription`]s read
//! the latest [`MeterView`] through a tokio watch channel.

use tokio::sync::watch;

use crate::data::MeterView;

/// A consumer handle for meter views.
///
/// # Example
///
/// ```
/// use wavenode_watch::{MemoryStore, Poller, HttpSource};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let source = Arc::new(HttpSource::builder().build().unwrap());
/// let poller = Poller::new(source, Arc::new(MemoryStore::new()));
///
/// let mut subscription = poller.subscribe();
/// // The current view is returned on the first poll.
/// assert!(subscription.poll().is_some());
/// assert!(subscription.poll().is_none());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Subscription {
    receiver: watch::Receiver<MeterView>,
    /// Track if we've returned the initial value yet
    initial_returned: bool,
}

impl Subscription {
    pub(crate) fn new(receiver: watch::Receiver<MeterView>) -> Self {
        Self {
            receiver,
            initial_returned: false,
        }
    }

    /// Non-blocking: the newest view if it changed since the last call.
    pub fn poll(&mut self) -> Option<MeterView> {
        if !self.initial_returned {
            self.initial_returned = true;
            self.receiver.mark_changed();
        }

        if self.receiver.has_changed().unwrap_or(false) {
            Some(self.receiver.borrow_and_update().clone())
        } else {
            None
        }
    }

    /// Wait for the next published view.
    ///
    /// Returns `None` once the poller has been dropped.
    pub async fn changed(&mut self) -> Option<MeterView> {
        self.initial_returned = true;
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// The most recent view, without marking it seen.
    pub fn latest(&self) -> MeterView {
        self.receiver.borrow().clone()
    }
}
