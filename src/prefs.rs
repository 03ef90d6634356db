//! User preferences and their persistence.
//!
//! Preferences live in two independently keyed records: device/poll settings
//! and meter display settings. Both are read once at startup through a
//! [`PrefsStore`] and written back after every change. A record that cannot
//! be read or parsed falls back to defaults on its own, without affecting the
//! other.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::data::HoldSettings;
use crate::error::StoreError;
use crate::source::{ChannelIndex, CHANNELS};

/// Bridge address used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8787";

/// Lower bound on the poll interval.
pub const MIN_POLL_MS: u64 = 100;

/// Store key of the device/poll record.
pub const DEVICE_KEY: &str = "wavenode";

/// Store key of the meter display record.
pub const METERS_KEY: &str = "wavenode_ui";

const DEFAULT_POLL_MS: u64 = 200;
const DEFAULT_THRESHOLD_WATTS: f64 = 1.0;
const DEFAULT_SWR_LIMIT: f64 = 3.0;

/// Key/value storage for preference records.
///
/// Unlike a fire-and-forget store, every operation reports failure so the
/// caller can decide whether to fall back to defaults.
pub trait PrefsStore: Send + Sync + Debug {
    /// Read the raw record stored under `key`, `Ok(None)` if never written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the record stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store, mostly for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store that keeps each record in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl PrefsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// Connection and hold settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevicePrefs {
    pub base_url: String,
    pub poll_ms: u64,
    /// Hold peaks until the next transmission.
    pub hold_enabled: bool,
    /// Treat a channel as transmitting when its average power reaches this.
    pub rf_threshold_watts: f64,
}

impl Default for DevicePrefs {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_ms: DEFAULT_POLL_MS,
            hold_enabled: false,
            rf_threshold_watts: DEFAULT_THRESHOLD_WATTS,
        }
    }
}

impl DevicePrefs {
    fn sanitize(&mut self) {
        self.base_url = self.base_url.trim().to_string();
        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        self.poll_ms = self.poll_ms.max(MIN_POLL_MS);
        self.rf_threshold_watts = clamp_threshold(self.rf_threshold_watts);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(MIN_POLL_MS))
    }
}

/// Display settings for one meter channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSlot {
    pub name: String,
    pub visible: bool,
}

impl Default for MeterSlot {
    fn default() -> Self {
        Self {
            name: String::new(),
            visible: true,
        }
    }
}

/// Meter names, visibility and SWR alarm settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeterPrefs {
    pub meters: Vec<MeterSlot>,
    /// Index of the channel whose activity gates the others.
    pub swr_sensor: usize,
    pub swr_limit: f64,
}

impl Default for MeterPrefs {
    fn default() -> Self {
        Self {
            meters: (0..CHANNELS)
                .map(|i| MeterSlot {
                    name: default_meter_name(i),
                    visible: true,
                })
                .collect(),
            swr_sensor: 0,
            swr_limit: DEFAULT_SWR_LIMIT,
        }
    }
}

impl MeterPrefs {
    fn sanitize(&mut self) {
        self.meters.truncate(CHANNELS);
        while self.meters.len() < CHANNELS {
            self.meters.push(MeterSlot::default());
        }
        for (i, slot) in self.meters.iter_mut().enumerate() {
            if slot.name.trim().is_empty() {
                slot.name = default_meter_name(i);
            }
        }
        self.swr_sensor = self.swr_sensor.min(CHANNELS - 1);
        self.swr_limit = clamp_swr_limit(self.swr_limit);
    }

    pub fn slot(&self, channel: ChannelIndex) -> &MeterSlot {
        &self.meters[channel.get()]
    }

    pub fn sense_channel(&self) -> ChannelIndex {
        ChannelIndex::clamped(self.swr_sensor as i64)
    }
}

fn default_meter_name(index: usize) -> String {
    format!("Meter {}", index + 1)
}

/// Non-finite thresholds fall back to the default; negatives clamp to zero.
pub fn clamp_threshold(watts: f64) -> f64 {
    if watts.is_finite() {
        watts.max(0.0)
    } else {
        DEFAULT_THRESHOLD_WATTS
    }
}

/// Non-finite limits fall back to the default; others clamp to `[1, 10]`.
pub fn clamp_swr_limit(limit: f64) -> f64 {
    if limit.is_finite() {
        limit.clamp(1.0, 10.0)
    } else {
        DEFAULT_SWR_LIMIT
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub device: DevicePrefs,
    pub meters: MeterPrefs,
}

impl Config {
    /// Load both records from `store`, merging each over the defaults.
    ///
    /// Never fails: an unreadable or malformed record is logged and replaced
    /// by its defaults.
    pub fn load(store: &dyn PrefsStore) -> Self {
        let mut config = Self {
            device: load_record(store, DEVICE_KEY),
            meters: load_record(store, METERS_KEY),
        };
        config.sanitize();
        config
    }

    /// Persist both records. Stops at the first failure.
    pub fn save(&self, store: &dyn PrefsStore) -> Result<(), StoreError> {
        self.save_device(store)?;
        self.save_meters(store)
    }

    pub fn save_device(&self, store: &dyn PrefsStore) -> Result<(), StoreError> {
        store.set(DEVICE_KEY, &serde_json::to_string(&self.device)?)
    }

    pub fn save_meters(&self, store: &dyn PrefsStore) -> Result<(), StoreError> {
        store.set(METERS_KEY, &serde_json::to_string(&self.meters)?)
    }

    /// Re-apply every clamp and default.
    pub fn sanitize(&mut self) {
        self.device.sanitize();
        self.meters.sanitize();
    }

    pub fn hold_settings(&self) -> HoldSettings {
        HoldSettings {
            enabled: self.device.hold_enabled,
            threshold_watts: self.device.rf_threshold_watts,
            sense: self.meters.sense_channel(),
        }
    }

    pub fn swr_limit(&self) -> f64 {
        self.meters.swr_limit
    }
}

fn load_record<T>(store: &dyn PrefsStore, key: &str) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    match store.get(key) {
        Ok(Some(raw)) => merge_record(key, &raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "Ignoring malformed preferences record");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "Failed to read preferences record");
            T::default()
        }
    }
}

/// Merge a stored record over the defaults one field at a time.
///
/// A field whose stored value does not fit its type keeps the default, so a
/// single bad entry cannot take the rest of the record down with it.
fn merge_record<T>(key: &str, raw: &str) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned + Default,
{
    let stored: Value = serde_json::from_str(raw)?;
    let mut merged = serde_json::to_value(T::default())?;

    if let (Value::Object(stored), Value::Object(fields)) = (stored, &mut merged) {
        for (field, value) in stored {
            let previous = fields.insert(field.clone(), value);
            if serde_json::from_value::<T>(Value::Object(fields.clone())).is_err() {
                warn!(key, field = %field, "Ignoring invalid preferences field");
                match previous {
                    Some(default) => fields.insert(field, default),
                    None => fields.remove(&field),
                };
            }
        }
    }

    serde_json::from_value(merged)
}
