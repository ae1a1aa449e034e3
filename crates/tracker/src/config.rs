use haul_track_core::{PositionError, PositionOptions, PositionSample};
use model::QualityTier;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Passed through to the positioning source untouched.
    pub position: PositionOptions,
    pub auto_start: bool,
    /// Per-sample debug logging.
    pub enable_logging: bool,
    pub operation_id: Option<String>,
    pub vehicle_id: Option<String>,

    /// Jitter floor: smaller displacements never count as travel.
    pub min_distance_m: f64,
    /// Below this speed the heading is held instead of recomputed.
    pub min_speed_for_heading_kph: f64,
    pub heading_window: usize,
    pub speed_window: usize,
    pub speed_history_len: usize,
    /// Minimum spacing between delivery attempts, in sample time.
    pub send_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            position: PositionOptions::default(),
            auto_start: false,
            enable_logging: false,
            operation_id: None,
            vehicle_id: None,
            min_distance_m: 1.0,
            min_speed_for_heading_kph: 0.5,
            heading_window: 5,
            speed_window: 3,
            speed_history_len: 50,
            send_interval_ms: 5_000,
        }
    }
}

/// Partial update as sent by the field client (camelCase JSON).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOptions {
    pub enable_high_accuracy: Option<bool>,
    /// ms
    pub timeout: Option<u64>,
    /// ms
    pub maximum_age: Option<u64>,
    pub auto_start: Option<bool>,
    pub enable_logging: Option<bool>,
    pub operation_id: Option<String>,
    pub vehicle_id: Option<String>,
    /// ms
    pub send_interval: Option<u64>,
}

impl TrackerOptions {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl TrackerConfig {
    pub fn apply(&mut self, o: TrackerOptions) {
        if let Some(v) = o.enable_high_accuracy { self.position.enable_high_accuracy = v; }
        if let Some(v) = o.timeout { self.position.timeout_ms = v; }
        if let Some(v) = o.maximum_age { self.position.maximum_age_ms = v; }
        if let Some(v) = o.auto_start { self.auto_start = v; }
        if let Some(v) = o.enable_logging { self.enable_logging = v; }
        if o.operation_id.is_some() { self.operation_id = o.operation_id; }
        if o.vehicle_id.is_some() { self.vehicle_id = o.vehicle_id; }
        if let Some(v) = o.send_interval { self.send_interval_ms = v; }
    }
}

type Hook<T> = Option<Box<dyn FnMut(T) + Send>>;

/// Caller callbacks. All run synchronously on the thread processing samples.
#[derive(Default)]
pub struct TrackerHooks {
    pub on_position: Option<Box<dyn FnMut(&PositionSample) + Send>>,
    pub on_accuracy_change: Option<Box<dyn FnMut(f64, QualityTier) + Send>>,
    pub on_speed_change: Hook<f64>,
    pub on_heading_change: Hook<f64>,
    pub on_error: Option<Box<dyn FnMut(&PositionError, &str) + Send>>,
}

impl TrackerHooks {
    pub fn on_position(mut self, f: impl FnMut(&PositionSample) + Send + 'static) -> Self {
        self.on_position = Some(Box::new(f));
        self
    }

    pub fn on_accuracy_change(mut self, f: impl FnMut(f64, QualityTier) + Send + 'static) -> Self {
        self.on_accuracy_change = Some(Box::new(f));
        self
    }

    pub fn on_speed_change(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_speed_change = Some(Box::new(f));
        self
    }

    pub fn on_heading_change(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_heading_change = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&PositionError, &str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}
