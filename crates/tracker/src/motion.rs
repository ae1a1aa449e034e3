//! Per-update speed and heading determination.

use analysis::{bearing_deg, haversine_m, mps_to_kph, HeadingFilter, SpeedFilter};
use haul_track_core::PositionSample;

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub distance_m: f64,
    pub bearing_deg: f64,
    /// Instantaneous speed chosen for this update (reported or derived).
    pub speed_kph: f64,
    pub smoothed_speed_kph: f64,
    pub smoothed_heading_deg: Option<f64>,
    /// Speed cleared the heading threshold.
    pub moving: bool,
}

/// Owns both smoothing filters and the authoritative last speed/heading.
///
/// The last values are plain fields so the next update always reads what the
/// previous one wrote.
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    speed: SpeedFilter,
    heading: HeadingFilter,
    min_speed_for_heading_kph: f64,
    speed_kph: f64,
    heading_deg: Option<f64>,
}

impl MotionEstimator {
    pub fn new(cfg: &TrackerConfig) -> Self {
        Self {
            speed: SpeedFilter::new(cfg.speed_window),
            heading: HeadingFilter::new(cfg.heading_window),
            min_speed_for_heading_kph: cfg.min_speed_for_heading_kph,
            speed_kph: 0.0,
            heading_deg: None,
        }
    }

    pub fn speed_kph(&self) -> f64 { self.speed_kph }
    pub fn heading_deg(&self) -> Option<f64> { self.heading_deg }
    pub fn heading_buffer_len(&self) -> usize { self.heading.buffer().len() }
    pub fn speed_buffer_len(&self) -> usize { self.speed.buffer().len() }

    /// First fix of a track: nothing to diff against, take what the device says.
    pub fn seed(&mut self, s: &PositionSample) {
        self.speed_kph = s.reported_speed_mps().map(mps_to_kph).unwrap_or(0.0);
        if let Some(h) = s.reported_heading_deg() {
            self.heading_deg = Some(analysis::normalize_deg(h));
        }
    }

    pub fn update(&mut self, prev: &PositionSample, cur: &PositionSample) -> Motion {
        let distance_m = haversine_m(prev.lat, prev.lng, cur.lat, cur.lng);
        let bearing = bearing_deg(prev.lat, prev.lng, cur.lat, cur.lng);

        let speed_kph = match cur.reported_speed_mps() {
            Some(mps) => mps_to_kph(mps),
            None => {
                let dt_s = cur.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64 / 1000.0;
                if dt_s > 0.0 { mps_to_kph(distance_m / dt_s) } else { 0.0 }
            }
        };
        let moving = speed_kph >= self.min_speed_for_heading_kph;

        // reported > computed bearing (moving only) > hold last
        let heading = match cur.reported_heading_deg() {
            Some(h) => Some(h),
            None if moving => Some(bearing),
            None => self.heading_deg,
        };

        let smoothed_speed_kph = self.speed.apply(speed_kph);
        if moving {
            if let Some(h) = heading {
                self.heading.push(h);
            }
        }
        let smoothed_heading_deg = self.heading.smoothed(heading);

        self.speed_kph = smoothed_speed_kph;
        self.heading_deg = smoothed_heading_deg;

        Motion {
            distance_m,
            bearing_deg: bearing,
            speed_kph,
            smoothed_speed_kph,
            smoothed_heading_deg,
            moving,
        }
    }

    pub fn reset(&mut self) {
        self.speed.reset();
        self.heading.reset();
        self.speed_kph = 0.0;
        self.heading_deg = None;
    }
}
