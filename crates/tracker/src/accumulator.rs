use std::collections::VecDeque;

use haul_track_core::PositionSample;
use model::{PathPoint, TrackSummary};

use crate::motion::Motion;

/// Session-scoped track totals and route log.
#[derive(Debug, Clone)]
pub struct TrackAccumulator {
    min_distance_m: f64,
    history_len: usize,

    previous: Option<PositionSample>,
    current: Option<PositionSample>,
    distance_m: f64,
    speed_history: VecDeque<f64>,
    max_speed_kph: f64,
    avg_speed_kph: f64,
    started_at_ms: Option<u64>,
    duration_ms: u64,
    last_update_ms: Option<u64>,
    path: Vec<PathPoint>,
}

impl TrackAccumulator {
    pub fn new(min_distance_m: f64, history_len: usize) -> Self {
        Self {
            min_distance_m,
            history_len: history_len.max(1),
            previous: None,
            current: None,
            distance_m: 0.0,
            speed_history: VecDeque::with_capacity(history_len.max(1)),
            max_speed_kph: 0.0,
            avg_speed_kph: 0.0,
            started_at_ms: None,
            duration_ms: 0,
            last_update_ms: None,
            path: Vec::new(),
        }
    }

    pub fn previous(&self) -> Option<&PositionSample> { self.previous.as_ref() }
    pub fn current(&self) -> Option<&PositionSample> { self.current.as_ref() }
    pub fn distance_m(&self) -> f64 { self.distance_m }
    pub fn max_speed_kph(&self) -> f64 { self.max_speed_kph }
    pub fn avg_speed_kph(&self) -> f64 { self.avg_speed_kph }
    pub fn duration_ms(&self) -> u64 { self.duration_ms }
    pub fn started_at_ms(&self) -> Option<u64> { self.started_at_ms }
    pub fn last_update_ms(&self) -> Option<u64> { self.last_update_ms }
    pub fn path(&self) -> &[PathPoint] { &self.path }
    pub fn speed_history_len(&self) -> usize { self.speed_history.len() }

    /// Position bookkeeping only. Used for every sample, including jitter and
    /// samples received while paused, so the next delta starts from here.
    pub fn observe(&mut self, s: &PositionSample) {
        self.previous = self.current.replace(s.clone());
        self.last_update_ms = Some(s.timestamp_ms);
    }

    /// First fix of a session (or after clear): opens the route.
    pub fn seed(&mut self, s: &PositionSample, point: PathPoint) {
        self.mark_start(s.timestamp_ms);
        self.observe(s);
        self.path.push(point);
    }

    /// Returns whether the update counted as movement.
    pub fn advance(&mut self, s: &PositionSample, motion: &Motion, point: PathPoint) -> bool {
        self.mark_start(s.timestamp_ms);
        self.observe(s);
        if motion.distance_m < self.min_distance_m {
            return false;
        }

        self.distance_m += motion.distance_m;

        let v = motion.smoothed_speed_kph;
        if self.speed_history.len() == self.history_len {
            self.speed_history.pop_front();
        }
        self.speed_history.push_back(v);
        self.max_speed_kph = self.max_speed_kph.max(v);
        self.avg_speed_kph = self.speed_history.iter().sum::<f64>() / self.speed_history.len() as f64;

        if let Some(start) = self.started_at_ms {
            self.duration_ms = s.timestamp_ms.saturating_sub(start);
        }
        self.path.push(point);
        true
    }

    fn mark_start(&mut self, ts: u64) {
        if self.started_at_ms.is_none() {
            self.started_at_ms = Some(ts);
        }
    }

    /// Session stopped: duration freezes, the next start opens a new marker.
    pub fn end(&mut self) {
        self.started_at_ms = None;
    }

    /// New session over the same track: totals and path stay, but the next
    /// fix opens a fresh leg instead of being diffed against the old one.
    pub fn restart(&mut self) {
        self.previous = None;
        self.current = None;
        self.started_at_ms = None;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.min_distance_m, self.history_len);
    }

    pub fn summary(&self, record_count: usize) -> TrackSummary {
        TrackSummary {
            distance_m: self.distance_m,
            avg_speed_kph: self.avg_speed_kph,
            max_speed_kph: self.max_speed_kph,
            duration_ms: self.duration_ms,
            point_count: self.path.len(),
            record_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(distance_m: f64, speed: f64) -> Motion {
        Motion {
            distance_m,
            bearing_deg: 0.0,
            speed_kph: speed,
            smoothed_speed_kph: speed,
            smoothed_heading_deg: None,
            moving: speed >= 0.5,
        }
    }

    fn point(s: &PositionSample, speed: f64) -> PathPoint {
        PathPoint {
            lat: s.lat,
            lng: s.lng,
            speed_kph: speed,
            heading_deg: None,
            accuracy_m: s.accuracy_m,
            timestamp_ms: s.timestamp_ms,
        }
    }

    #[test]
    fn jitter_moves_bookkeeping_but_not_totals() {
        let mut acc = TrackAccumulator::new(1.0, 50);
        let a = PositionSample::new(34.0, 135.0, 5.0, 0);
        acc.seed(&a, point(&a, 0.0));
        let b = PositionSample::new(34.000001, 135.0, 5.0, 1_000);
        assert!(!acc.advance(&b, &motion(0.11, 0.4), point(&b, 0.4)));
        assert_eq!(acc.distance_m(), 0.0);
        assert_eq!(acc.path().len(), 1);
        assert_eq!(acc.current(), Some(&b));
        assert_eq!(acc.previous(), Some(&a));
        assert_eq!(acc.last_update_ms(), Some(1_000));
    }

    #[test]
    fn movement_updates_totals() {
        let mut acc = TrackAccumulator::new(1.0, 50);
        let a = PositionSample::new(34.0, 135.0, 5.0, 10_000);
        acc.seed(&a, point(&a, 0.0));
        let b = PositionSample::new(34.0001, 135.0, 5.0, 11_000);
        assert!(acc.advance(&b, &motion(11.1, 40.0), point(&b, 40.0)));
        let c = PositionSample::new(34.0002, 135.0, 5.0, 12_000);
        assert!(acc.advance(&c, &motion(11.1, 20.0), point(&c, 20.0)));

        assert!((acc.distance_m() - 22.2).abs() < 1e-9);
        assert_eq!(acc.max_speed_kph(), 40.0);
        assert_eq!(acc.avg_speed_kph(), 30.0);
        assert_eq!(acc.duration_ms(), 2_000);
        assert_eq!(acc.path().len(), 3);
    }

    #[test]
    fn speed_history_is_bounded() {
        let mut acc = TrackAccumulator::new(1.0, 50);
        for i in 0..120u64 {
            let s = PositionSample::new(0.0, 0.0, 5.0, i);
            acc.advance(&s, &motion(5.0, i as f64), point(&s, i as f64));
        }
        assert_eq!(acc.speed_history_len(), 50);
        // mean of 70..=119
        assert_eq!(acc.avg_speed_kph(), 94.5);
        assert_eq!(acc.max_speed_kph(), 119.0);
    }

    #[test]
    fn restart_keeps_totals_and_drops_position() {
        let mut acc = TrackAccumulator::new(1.0, 50);
        let a = PositionSample::new(34.0, 135.0, 5.0, 0);
        acc.seed(&a, point(&a, 0.0));
        let b = PositionSample::new(34.0001, 135.0, 5.0, 1_000);
        acc.advance(&b, &motion(11.1, 40.0), point(&b, 40.0));
        acc.end();
        acc.restart();
        assert_eq!(acc.current(), None);
        assert_eq!(acc.previous(), None);
        assert!((acc.distance_m() - 11.1).abs() < 1e-9);
        assert_eq!(acc.path().len(), 2);
        assert_eq!(acc.max_speed_kph(), 40.0);
    }

    #[test]
    fn end_freezes_and_reset_clears() {
        let mut acc = TrackAccumulator::new(1.0, 50);
        let a = PositionSample::new(0.0, 0.0, 5.0, 0);
        acc.seed(&a, point(&a, 0.0));
        acc.end();
        assert_eq!(acc.started_at_ms(), None);
        acc.reset();
        assert_eq!(acc.path().len(), 0);
        assert_eq!(acc.current(), None);
        assert_eq!(acc.summary(0), TrackSummary::default());
    }
}
