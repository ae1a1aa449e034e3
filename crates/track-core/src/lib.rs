//! Core position model and collaborator traits used by the tracker

use std::time::Duration;

use model::TelemetryRecord;
use serde::{Deserialize, Serialize};

/// One raw reading from a positioning source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    /// Instantaneous speed reported by the device, m/s.
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Course over ground reported by the device, degrees 0..360.
    #[serde(default)]
    pub heading_deg: Option<f64>,
    pub timestamp_ms: u64,
}

impl PositionSample {
    pub fn new(lat: f64, lng: f64, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self { lat, lng, accuracy_m, altitude_m: None, speed_mps: None, heading_deg: None, timestamp_ms }
    }

    pub fn with_speed(mut self, mps: f64) -> Self { self.speed_mps = Some(mps); self }
    pub fn with_heading(mut self, deg: f64) -> Self { self.heading_deg = Some(deg); self }
    pub fn with_altitude(mut self, m: f64) -> Self { self.altitude_m = Some(m); self }

    /// Reported speed, ignoring the negative sentinel some devices use for "unknown".
    pub fn reported_speed_mps(&self) -> Option<f64> {
        self.speed_mps.filter(|s| s.is_finite() && *s >= 0.0)
    }

    pub fn reported_heading_deg(&self) -> Option<f64> {
        self.heading_deg.filter(|h| h.is_finite() && *h >= 0.0)
    }
}

/// Acquisition options handed to the source untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self { enable_high_accuracy: true, timeout_ms: 10_000, maximum_age_ms: 0 }
    }
}

impl PositionOptions {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
    pub fn maximum_age(&self) -> Duration { Duration::from_millis(self.maximum_age_ms) }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timed out waiting for a position")]
    Timeout,
    #[error("positioning is not supported on this device")]
    NotSupported,
}

impl PositionError {
    /// Message shown to the operator.
    pub fn user_message(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => "Location permission was denied. Allow location access and start tracking again.",
            PositionError::PositionUnavailable(_) => "Current position is unavailable. Check the GPS signal.",
            PositionError::Timeout => "Timed out acquiring a position. Try again.",
            PositionError::NotSupported => "This device does not support positioning.",
        }
    }

    /// Fatal errors end the session; the caller has to start again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PositionError::PermissionDenied | PositionError::NotSupported)
    }
}

pub type PositionEvent = Result<PositionSample, PositionError>;
pub type PositionTx = crossbeam_channel::Sender<PositionEvent>;
pub type PositionRx = crossbeam_channel::Receiver<PositionEvent>;

pub fn channel() -> (PositionTx, PositionRx) {
    crossbeam_channel::unbounded()
}

/// Trait for any device positioning capability
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    fn is_available(&self) -> bool { true }

    async fn current_position(&self, opts: &PositionOptions) -> Result<PositionSample, PositionError>;

    /// Push fixes (or errors) into `tx` until the receiver goes away or the
    /// source is exhausted. Cancelled by aborting the task running it.
    async fn watch(&self, opts: PositionOptions, tx: PositionTx) -> Result<(), PositionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("endpoint rejected telemetry with status {0}")]
    Rejected(u16),
    #[error("{0}")]
    Msg(String),
}

/// Remote collaborator that accepts telemetry records
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, record: &TelemetryRecord) -> Result<(), DeliveryError>;
    async fn send_batch(&self, records: &[TelemetryRecord]) -> Result<(), DeliveryError>;
}

/// Plays back a fixed list of events. Used for offline replay of recorded logs.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    initial: Option<PositionEvent>,
    events: Vec<PositionEvent>,
    interval: Option<Duration>,
    unavailable: bool,
}

impl ReplaySource {
    pub fn new(events: Vec<PositionEvent>) -> Self {
        Self { events, ..Default::default() }
    }

    pub fn from_samples<I: IntoIterator<Item = PositionSample>>(samples: I) -> Self {
        Self::new(samples.into_iter().map(Ok).collect())
    }

    /// Answer for the one-shot request made on start.
    pub fn with_initial(mut self, ev: PositionEvent) -> Self {
        self.initial = Some(ev);
        self
    }

    /// Pace playback instead of pushing everything at once.
    pub fn with_interval(mut self, d: Duration) -> Self {
        self.interval = Some(d);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait::async_trait]
impl PositionSource for ReplaySource {
    fn is_available(&self) -> bool { !self.unavailable }

    async fn current_position(&self, _opts: &PositionOptions) -> Result<PositionSample, PositionError> {
        match &self.initial {
            Some(ev) => ev.clone(),
            None => Err(PositionError::PositionUnavailable("no initial fix recorded".into())),
        }
    }

    async fn watch(&self, _opts: PositionOptions, tx: PositionTx) -> Result<(), PositionError> {
        for ev in &self.events {
            if let Some(d) = self.interval {
                tokio::time::sleep(d).await;
            }
            if tx.send(ev.clone()).is_err() {
                tracing::debug!("replay receiver dropped, stopping playback");
                break;
            }
        }
        Ok(())
    }
}
