//! Periodic polling of the status endpoint.
//!
//! The [`Poller`] owns the [`MeterState`], runs a fixed-delay loop against a
//! [`StatusSource`], and publishes a [`MeterView`] after every settled poll
//! and every user action.
//!
//! ## Ordering
//!
//! The next request is only issued once the previous one has settled, and
//! each request carries a monotonic sequence number checked under the state
//! lock, so a late response can never overwrite newer state. Stopping ends
//! the current generation under the same lock; anything still in flight is
//! dropped rather than applied.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::{MeterView, ResetTarget};
use crate::error::{PollError, StoreError};
use crate::meter::{MeterState, PollOutcome};
use crate::prefs::{Config, PrefsStore};
use crate::source::{status_url, ChannelIndex, StatusSource, Subscription};

/// A running poll loop.
#[derive(Debug)]
struct PollTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Which preference record a change touched.
#[derive(Debug, Clone, Copy)]
enum Record {
    Device,
    Meters,
}

/// Drives the status endpoint and publishes meter views.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wavenode_watch::{FileStore, HttpSource, Poller};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let source = Arc::new(HttpSource::builder().build()?);
///     let store = Arc::new(FileStore::new("/tmp/wavenode"));
///     let mut poller = Poller::new(source, store);
///
///     let mut views = poller.subscribe();
///     poller.start();
///
///     while let Some(view) = views.changed().await {
///         println!("{:?} worst SWR {:?}", view.status, view.worst_swr);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Poller {
    source: Arc<dyn StatusSource>,
    store: Arc<dyn PrefsStore>,
    state: Arc<Mutex<MeterState>>,
    publisher: Arc<watch::Sender<MeterView>>,
    task: Option<PollTask>,
}

impl Poller {
    /// Create a poller with configuration loaded from `store`.
    pub fn new(source: Arc<dyn StatusSource>, store: Arc<dyn PrefsStore>) -> Self {
        let config = Config::load(store.as_ref());
        Self::with_config(source, store, config)
    }

    /// Create a poller with an explicit configuration.
    pub fn with_config(
        source: Arc<dyn StatusSource>,
        store: Arc<dyn PrefsStore>,
        config: Config,
    ) -> Self {
        let state = MeterState::new(config);
        let (publisher, _) = watch::channel(state.view());
        Self {
            source,
            store,
            state: Arc::new(Mutex::new(state)),
            publisher: Arc::new(publisher),
            task: None,
        }
    }

    /// Subscribe to published views.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.publisher.subscribe())
    }

    /// The current view.
    pub fn view(&self) -> MeterView {
        self.state.lock().view()
    }

    pub fn config(&self) -> Config {
        self.state.lock().config().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Start polling with the current configuration.
    ///
    /// Any previous loop is stopped first. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self) {
        self.stop();

        let (url, interval, generation) = {
            let state = self.state.lock();
            let device = &state.config().device;
            (
                status_url(&device.base_url),
                device.poll_interval(),
                state.generation(),
            )
        };

        info!(
            url = %url,
            interval_ms = interval.as_millis() as u64,
            source = self.source.description(),
            "Starting poller"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.source.clone(),
            self.state.clone(),
            self.publisher.clone(),
            url,
            interval,
            generation,
            stop_rx,
        ));

        self.task = Some(PollTask { stop_tx, handle });
    }

    /// Stop polling. The in-flight request, if any, is cancelled and its
    /// result will not be applied.
    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.state.lock().end_generation();
        let _ = task.stop_tx.send(true);
        task.handle.abort();
        info!("Poller stopped");
    }

    /// Perform a single poll outside the loop and return the resulting view.
    pub async fn poll_once(&self) -> MeterView {
        let (url, interval, generation, sequence) = {
            let mut state = self.state.lock();
            let device = &state.config().device;
            let url = status_url(&device.base_url);
            let interval = device.poll_interval();
            let generation = state.generation();
            (url, interval, generation, state.next_sequence())
        };

        let result = fetch_bounded(self.source.as_ref(), &url, interval).await;
        settle(&self.state, &self.publisher, generation, sequence, result);
        self.view()
    }

    /// Clear hold memory for one channel or all of them.
    pub fn reset(&self, target: ResetTarget) {
        self.mutate(|state| state.reset(target));
    }

    pub fn set_hold_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.mutate(|state| state.set_hold_enabled(enabled));
        self.persist(Record::Device)
    }

    pub fn set_threshold(&self, watts: f64) -> Result<(), StoreError> {
        self.mutate(|state| state.set_threshold(watts));
        self.persist(Record::Device)
    }

    pub fn set_swr_limit(&self, limit: f64) -> Result<(), StoreError> {
        self.mutate(|state| state.set_swr_limit(limit));
        self.persist(Record::Meters)
    }

    pub fn set_sense_channel(&self, channel: ChannelIndex) -> Result<(), StoreError> {
        self.mutate(|state| state.set_sense_channel(channel));
        self.persist(Record::Meters)
    }

    pub fn set_meter_name(&self, channel: ChannelIndex, name: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.set_meter_name(channel, name));
        self.persist(Record::Meters)
    }

    pub fn set_meter_visible(&self, channel: ChannelIndex, visible: bool) -> Result<(), StoreError> {
        self.mutate(|state| state.set_meter_visible(channel, visible));
        self.persist(Record::Meters)
    }

    /// Point the poller at a different bridge, restarting the loop if running.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.set_base_url(base_url));
        self.restart_if_running();
        self.persist(Record::Device)
    }

    /// Change the poll interval, restarting the loop if running.
    pub fn set_poll_interval(&mut self, interval: Duration) -> Result<(), StoreError> {
        let poll_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.mutate(|state| state.set_poll_ms(poll_ms));
        self.restart_if_running();
        self.persist(Record::Device)
    }

    fn restart_if_running(&mut self) {
        if self.task.is_some() {
            self.start();
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut MeterState)) {
        let mut state = self.state.lock();
        f(&mut *state);
        self.publisher.send_replace(state.view());
    }

    fn persist(&self, record: Record) -> Result<(), StoreError> {
        let config = self.config();
        let result = match record {
            Record::Device => config.save_device(self.store.as_ref()),
            Record::Meters => config.save_meters(self.store.as_ref()),
        };
        if let Err(e) = &result {
            warn!(record = ?record, error = %e, "Failed to persist preferences");
        }
        result
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetch with the request bounded by one poll interval.
async fn fetch_bounded(
    source: &dyn StatusSource,
    url: &str,
    interval: Duration,
) -> Result<serde_json::Value, PollError> {
    tokio::time::timeout(interval, source.fetch(url))
        .await
        .unwrap_or(Err(PollError::Timeout))
}

/// Apply one result under the state lock and publish if it was used.
fn settle(
    state: &Mutex<MeterState>,
    publisher: &watch::Sender<MeterView>,
    generation: u64,
    sequence: u64,
    result: Result<serde_json::Value, PollError>,
) -> PollOutcome {
    let mut state = state.lock();
    let outcome = state.apply(generation, sequence, result);

    match &outcome {
        PollOutcome::Applied => {
            debug!(sequence, "Applied status snapshot");
        }
        PollOutcome::Failed { was_connected } => {
            let error = state.last_error().unwrap_or_default();
            if *was_connected || sequence == 1 {
                warn!(sequence, error, "Lost connection to status endpoint");
            } else {
                debug!(sequence, error, "Status endpoint still unreachable");
            }
        }
        PollOutcome::Discarded => {
            debug!(sequence, "Discarded out-of-date status response");
            return outcome;
        }
    }

    publisher.send_replace(state.view());
    outcome
}

async fn run_loop(
    source: Arc<dyn StatusSource>,
    state: Arc<Mutex<MeterState>>,
    publisher: Arc<watch::Sender<MeterView>>,
    url: String,
    interval: Duration,
    generation: u64,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut connected = state.lock().is_connected();

    loop {
        let sequence = state.lock().next_sequence();

        let result = tokio::select! {
            result = fetch_bounded(source.as_ref(), &url, interval) => result,
            _ = stop_rx.changed() => break,
        };

        let outcome = settle(&state, &publisher, generation, sequence, result);
        match outcome {
            PollOutcome::Applied if !connected => {
                info!(url = %url, "Connected to status endpoint");
                connected = true;
            }
            PollOutcome::Failed { .. } => connected = false,
            _ => {}
        }

        // Fixed delay: the next request is scheduled only after this one settled.
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HoldPhase, LinkStatus};
    use crate::prefs::{MemoryStore, DEVICE_KEY, METERS_KEY};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    /// Source that replays a script of (delay, result) pairs, then repeats
    /// the last entry.
    #[derive(Debug)]
    struct ScriptedSource {
        script: Mutex<VecDeque<(Duration, Result<Value, u16>)>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<Value, u16>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                urls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.urls.lock().len()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<Value, PollError> {
            self.urls.lock().push(url.to_string());
            let (delay, result) = {
                let mut script = self.script.lock();
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                }
            }
            .unwrap_or((Duration::ZERO, Err(599)));

            tokio::time::sleep(delay).await;
            result.map_err(PollError::Http)
        }

        fn description(&self) -> &str {
            "scripted"
        }
    }

    fn status(avg: f64, swr: f64) -> Value {
        json!({
            "stale": false,
            "values": {
                "avgWatts": [avg, 0, 0, 0],
                "peakWatts": [avg, 0, 0, 0],
                "swr": [swr, -1, -1, -1]
            }
        })
    }

    fn poller_with(source: Arc<ScriptedSource>, config: Config) -> Poller {
        Poller::with_config(source, Arc::new(MemoryStore::new()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_publishes_views() {
        let source = ScriptedSource::new(vec![
            (Duration::from_millis(10), Ok(status(50.0, 1.4))),
            (Duration::from_millis(10), Ok(status(80.0, 1.6))),
        ]);
        let mut poller = poller_with(source.clone(), Config::default());
        let mut views = poller.subscribe();
        views.poll();

        poller.start();
        assert!(poller.is_running());

        let first = views.changed().await.unwrap();
        assert!(first.connected);
        assert_eq!(first.status, LinkStatus::Live);
        assert_eq!(first.channels[0].avg_watts, 50.0);

        let second = views.changed().await.unwrap();
        assert_eq!(second.channels[0].avg_watts, 80.0);
        assert!(second.sequence > first.sequence);

        poller.stop();
        assert!(!poller.is_running());
        assert_eq!(
            source.urls.lock()[0],
            "http://localhost:8787/api/wavenode/status"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Err(500)),
            (Duration::ZERO, Err(502)),
            (Duration::ZERO, Ok(status(20.0, 1.2))),
        ]);
        let mut poller = poller_with(source.clone(), Config::default());
        let mut views = poller.subscribe();
        views.poll();
        poller.start();

        let v = views.changed().await.unwrap();
        assert!(!v.connected);
        assert_eq!(v.error.as_deref(), Some("HTTP 500"));

        let v = views.changed().await.unwrap();
        assert_eq!(v.error.as_deref(), Some("HTTP 502"));

        let v = views.changed().await.unwrap();
        assert!(v.connected);
        assert!(v.error.is_none());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_times_out_after_one_interval() {
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(30), Ok(status(99.0, 1.0))),
            (Duration::ZERO, Ok(status(10.0, 1.1))),
        ]);
        let mut poller = poller_with(source, Config::default());
        let mut views = poller.subscribe();
        views.poll();
        poller.start();

        let v = views.changed().await.unwrap();
        assert!(!v.connected);
        assert_eq!(v.error.as_deref(), Some("Request timed out"));

        let v = views.changed().await.unwrap();
        assert!(v.connected);
        assert_eq!(v.channels[0].avg_watts, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_polls() {
        let source = ScriptedSource::new(vec![(Duration::from_millis(50), Ok(status(5.0, 1.1)))]);
        let mut config = Config::default();
        config.device.poll_ms = 200;
        let mut poller = poller_with(source.clone(), config);
        poller.start();

        // Each cycle is 50 ms fetch + 200 ms delay.
        tokio::time::sleep(Duration::from_millis(1010)).await;
        poller.stop();
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_response() {
        let source = ScriptedSource::new(vec![(Duration::from_millis(80), Ok(status(50.0, 1.5)))]);
        let mut poller = poller_with(source.clone(), Config::default());
        poller.start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        poller.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let view = poller.view();
        assert_eq!(view.sequence, 0);
        assert!(!view.connected);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_url_change_restarts_loop() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(status(5.0, 1.1)))]);
        let mut poller = poller_with(source.clone(), Config::default());
        poller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        poller.set_base_url("http://10.0.0.7:8787/").unwrap();
        assert!(poller.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop();

        let urls = source.urls.lock().clone();
        assert_eq!(urls.first().unwrap(), "http://localhost:8787/api/wavenode/status");
        assert_eq!(urls.last().unwrap(), "http://10.0.0.7:8787/api/wavenode/status");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_and_user_actions() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(status(100.0, 1.7))),
            (Duration::ZERO, Ok(status(0.0, -1.0))),
        ]);
        let store = Arc::new(MemoryStore::new());
        let poller = Poller::new(source, store.clone());

        poller.set_hold_enabled(true).unwrap();
        poller.poll_once().await;
        let view = poller.poll_once().await;
        assert_eq!(view.channels[0].hold, HoldPhase::Latched);
        assert_eq!(view.channels[0].avg_watts, 100.0);
        assert_eq!(view.channels[0].display_swr, Some(1.7));

        poller.reset(ResetTarget::All);
        let view = poller.view();
        assert_eq!(view.channels[0].hold, HoldPhase::Inactive);
        assert_eq!(view.channels[0].avg_watts, 0.0);

        poller.set_meter_name(ChannelIndex::ALL[1], "Beam").unwrap();
        poller.set_swr_limit(2.0).unwrap();
        assert!(store.get(DEVICE_KEY).unwrap().unwrap().contains("\"holdEnabled\":true"));
        let meters = store.get(METERS_KEY).unwrap().unwrap();
        assert!(meters.contains("Beam"));
        assert!(meters.contains("\"swrLimit\":2.0"));

        let reloaded = Config::load(store.as_ref());
        assert!(reloaded.device.hold_enabled);
        assert_eq!(reloaded.meters.meters[1].name, "Beam");
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_user_actions() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(status(100.0, 1.7)))]);
        let poller = poller_with(source, Config::default());
        let mut views = poller.subscribe();
        views.poll();

        poller.set_meter_visible(ChannelIndex::ALL[3], false).unwrap();
        let view = views.poll().unwrap();
        assert!(!view.channels[3].visible);
        assert_eq!(view.visible_channels().count(), 3);
    }
}
