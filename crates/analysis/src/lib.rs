use std::collections::VecDeque;

use model::QualityTier;

/// Mean Earth radius used by the spherical model, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// Great-circle distance in meters between two points (haversine).
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lng2 - lng1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    // clamp guards sqrt(1 - a) against rounding just above 1.0
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Forward azimuth from the first point to the second, degrees in [0, 360).
pub fn bearing_deg(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lng2 - lng1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    normalize_deg(y.atan2(x).to_degrees())
}

pub fn normalize_deg(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}

pub fn mps_to_kph(mps: f64) -> f64 {
    mps * 3.6
}

/// Fixed-capacity ring of recent values. Pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct SmoothingBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SmoothingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { values: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, v: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(v);
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }
    pub fn clear(&mut self) { self.values.clear(); }

    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.values.iter()
    }

    /// Arithmetic mean, or `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Mean angle in degrees, computed on the unit circle.
    pub fn circular_mean(&self) -> Option<f64> {
        circular_mean_deg(self.values.iter().copied())
    }
}

/// Average of angles via their sine/cosine components.
///
/// Returns `None` for an empty input or when the components cancel out
/// exactly (e.g. 0° and 180°), where no mean direction exists.
pub fn circular_mean_deg<I: IntoIterator<Item = f64>>(angles: I) -> Option<f64> {
    let (mut s, mut c, mut n) = (0.0_f64, 0.0_f64, 0usize);
    for a in angles {
        let r = a.to_radians();
        s += r.sin();
        c += r.cos();
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let (s, c) = (s / n as f64, c / n as f64);
    if s.abs() < 1e-12 && c.abs() < 1e-12 {
        return None;
    }
    Some(normalize_deg(s.atan2(c).to_degrees()))
}

/// Linear speed filter: push then average.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    buf: SmoothingBuffer,
}

impl SpeedFilter {
    pub fn new(capacity: usize) -> Self { Self { buf: SmoothingBuffer::new(capacity) } }

    pub fn apply(&mut self, speed_kph: f64) -> f64 {
        self.buf.push(speed_kph);
        self.buf.mean().unwrap_or(speed_kph)
    }

    pub fn buffer(&self) -> &SmoothingBuffer { &self.buf }
    pub fn reset(&mut self) { self.buf.clear(); }
}

/// Circular heading filter.
///
/// Only headings observed while moving are buffered; `smoothed` falls back to
/// the instantaneous value while the buffer is still empty.
#[derive(Debug, Clone)]
pub struct HeadingFilter {
    buf: SmoothingBuffer,
}

impl HeadingFilter {
    pub fn new(capacity: usize) -> Self { Self { buf: SmoothingBuffer::new(capacity) } }

    pub fn push(&mut self, heading_deg: f64) {
        self.buf.push(normalize_deg(heading_deg));
    }

    pub fn smoothed(&self, instantaneous: Option<f64>) -> Option<f64> {
        self.buf.circular_mean().or(instantaneous)
    }

    pub fn buffer(&self) -> &SmoothingBuffer { &self.buf }
    pub fn reset(&mut self) { self.buf.clear(); }
}

/// Accuracy threshold sets. The engine and the operator display disagree on
/// where the tiers start, so both are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyScale {
    /// 5 / 15 / 50 m
    Engine,
    /// 10 / 30 / 50 m
    Display,
}

impl AccuracyScale {
    fn thresholds(self) -> (f64, f64, f64) {
        match self {
            AccuracyScale::Engine => (5.0, 15.0, 50.0),
            AccuracyScale::Display => (10.0, 30.0, 50.0),
        }
    }
}

pub fn classify_accuracy(accuracy_m: f64, scale: AccuracyScale) -> QualityTier {
    let (high, medium, low) = scale.thresholds();
    if accuracy_m <= high {
        QualityTier::High
    } else if accuracy_m <= medium {
        QualityTier::Medium
    } else if accuracy_m <= low {
        QualityTier::Low
    } else {
        // NaN lands here too
        QualityTier::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn angle_close(a: f64, b: f64, tol: f64) -> bool {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d) <= tol
    }

    #[test]
    fn rejects_out_of_range_and_non_finite() {
        assert!(is_valid_coordinate(34.0, 135.0));
        assert!(is_valid_coordinate(-90.0, 180.0));
        assert!(!is_valid_coordinate(90.0001, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::INFINITY));
    }

    #[test]
    fn haversine_basics() {
        assert_eq!(haversine_m(34.0, 135.0, 34.0, 135.0), 0.0);
        let d = haversine_m(34.0, 135.0, 34.0001, 135.0);
        assert!(close(d, 11.12, 0.05), "got {d}");
        let back = haversine_m(34.0001, 135.0, 34.0, 135.0);
        assert!(close(d, back, 1e-9));
        // one degree of latitude
        let deg = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!(close(deg, 111_194.9, 1.0), "got {deg}");
    }

    #[test]
    fn bearing_cardinal_directions() {
        assert!(angle_close(bearing_deg(34.0, 135.0, 34.0001, 135.0), 0.0, 1e-6));
        assert!(close(bearing_deg(0.0, 0.0, 0.0, 1.0), 90.0, 1e-6));
        assert!(close(bearing_deg(1.0, 0.0, 0.0, 0.0), 180.0, 1e-6));
        assert!(close(bearing_deg(0.0, 1.0, 0.0, 0.0), 270.0, 1e-6));
        let b = bearing_deg(10.0, 10.0, 9.0, 9.0);
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn circular_mean_handles_wrap() {
        let m = circular_mean_deg([350.0, 10.0]).unwrap();
        assert!(angle_close(m, 0.0, 1e-6), "got {m}");
        let m = circular_mean_deg([340.0, 350.0, 20.0]).unwrap();
        assert!(angle_close(m, 356.53, 0.05), "got {m}");
        assert!(circular_mean_deg(std::iter::empty()).is_none());
        assert!(circular_mean_deg([0.0, 180.0]).is_none());
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let mut b = SmoothingBuffer::new(5);
        for i in 0..100 {
            b.push(i as f64);
            assert!(b.len() <= 5);
        }
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![95.0, 96.0, 97.0, 98.0, 99.0]);
    }

    #[test]
    fn speed_filter_averages_last_three() {
        let mut f = SpeedFilter::new(3);
        assert_eq!(f.apply(30.0), 30.0);
        assert_eq!(f.apply(60.0), 45.0);
        assert_eq!(f.apply(90.0), 60.0);
        assert_eq!(f.apply(0.0), 50.0);
        assert_eq!(f.buffer().len(), 3);
    }

    #[test]
    fn heading_filter_falls_back_to_instantaneous() {
        let mut f = HeadingFilter::new(5);
        assert_eq!(f.smoothed(Some(42.0)), Some(42.0));
        assert_eq!(f.smoothed(None), None);
        f.push(350.0);
        f.push(10.0);
        let s = f.smoothed(Some(180.0)).unwrap();
        assert!(angle_close(s, 0.0, 1e-6));
    }

    #[test]
    fn classifier_tiers() {
        let e = AccuracyScale::Engine;
        assert_eq!(classify_accuracy(4.0, e), QualityTier::High);
        assert_eq!(classify_accuracy(12.0, e), QualityTier::Medium);
        assert_eq!(classify_accuracy(40.0, e), QualityTier::Low);
        assert_eq!(classify_accuracy(100.0, e), QualityTier::Poor);

        let d = AccuracyScale::Display;
        assert_eq!(classify_accuracy(8.0, d), QualityTier::High);
        assert_eq!(classify_accuracy(12.0, d), QualityTier::Medium);
        assert_eq!(classify_accuracy(30.0, d), QualityTier::Medium);
        assert_eq!(classify_accuracy(50.0, d), QualityTier::Low);
        assert_eq!(classify_accuracy(f64::NAN, d), QualityTier::Poor);
    }
}
