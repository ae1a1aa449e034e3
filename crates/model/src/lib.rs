use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Coarse classification of positioning accuracy. Ordered best to worst.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    Medium,
    Low,
    Poor,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
            QualityTier::Poor => "poor",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct PathPoint {
    pub lat: f64,
    pub lng: f64,
    pub speed_kph: f64,
    pub heading_deg: Option<f64>,
    pub accuracy_m: f64,
    pub timestamp_ms: u64,
}

/// One telemetry snapshot as sent to the fleet backend.
///
/// Field names follow the backend's camelCase JSON.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: f64,
    pub timestamp: u64,
}

impl TelemetryRecord {
    pub fn new(
        operation_id: Option<String>,
        vehicle_id: Option<String>,
        point: &PathPoint,
        altitude: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id,
            vehicle_id,
            latitude: point.lat,
            longitude: point.lng,
            accuracy: point.accuracy_m,
            altitude,
            heading: point.heading_deg,
            speed: point.speed_kph,
            timestamp: point.timestamp_ms,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TrackSummary {
    pub distance_m: f64,
    pub avg_speed_kph: f64,
    pub max_speed_kph: f64,
    pub duration_ms: u64,
    pub point_count: usize,
    pub record_count: usize,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackExport {
    pub exported_at: String,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    pub summary: TrackSummary,
    #[serde(default)]
    pub path: Vec<PathPoint>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryRecord>,
}
