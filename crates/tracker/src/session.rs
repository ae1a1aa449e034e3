use std::fmt;
use std::sync::Arc;

use analysis::{classify_accuracy, is_valid_coordinate, AccuracyScale};
use haul_track_core::{
    channel, PositionError, PositionEvent, PositionRx, PositionSample, PositionSource, TelemetrySink,
};
use model::{GeoPoint, PathPoint, QualityTier, TelemetryRecord, TrackExport, TrackSummary};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinHandle;

use crate::accumulator::TrackAccumulator;
use crate::config::{TrackerConfig, TrackerHooks, TrackerOptions};
use crate::emitter::{DeliveryStats, TelemetryEmitter};
use crate::error::TrackerError;
use crate::motion::MotionEstimator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Tracking,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Tracking => write!(f, "tracking"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// Open watch on the positioning source. Dropping it aborts the watch task.
struct Subscription {
    task: JoinHandle<()>,
    events: PositionRx,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read-only projection of the session for display.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub state: SessionState,
    /// True while a session is open, paused or not.
    pub is_tracking: bool,
    pub is_paused: bool,
    pub current_position: Option<GeoPoint>,
    pub previous_position: Option<GeoPoint>,
    pub last_error: Option<String>,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub speed_kph: f64,
    pub quality: Option<QualityTier>,
    pub display_quality: Option<QualityTier>,
    pub summary: TrackSummary,
    pub started_at_ms: Option<u64>,
    pub last_update_ms: Option<u64>,
    pub delivery: DeliveryStats,
}

/// One tracking session: owns the subscription, the filters and the track.
///
/// Events are processed one at a time on the caller's task, either pushed
/// directly through [`Tracker::handle_event`] or drained from the
/// subscription with [`Tracker::poll`].
pub struct Tracker {
    source: Arc<dyn PositionSource>,
    config: TrackerConfig,
    hooks: TrackerHooks,
    state: SessionState,
    subscription: Option<Subscription>,
    motion: MotionEstimator,
    track: TrackAccumulator,
    emitter: TelemetryEmitter,
    last_error: Option<PositionError>,
    accuracy_m: Option<f64>,
    altitude_m: Option<f64>,
}

impl Tracker {
    pub fn new(
        source: Arc<dyn PositionSource>,
        sink: Option<Arc<dyn TelemetrySink>>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            source,
            motion: MotionEstimator::new(&config),
            track: TrackAccumulator::new(config.min_distance_m, config.speed_history_len),
            emitter: TelemetryEmitter::new(sink, config.send_interval_ms),
            config,
            hooks: TrackerHooks::default(),
            state: SessionState::Idle,
            subscription: None,
            last_error: None,
            accuracy_m: None,
            altitude_m: None,
        }
    }

    /// Build a tracker and start it right away when `auto_start` is set.
    pub async fn launch(
        source: Arc<dyn PositionSource>,
        sink: Option<Arc<dyn TelemetrySink>>,
        config: TrackerConfig,
        hooks: TrackerHooks,
    ) -> Result<Self, TrackerError> {
        let mut t = Self::new(source, sink, config).with_hooks(hooks);
        if t.config.auto_start {
            t.start().await?;
        }
        Ok(t)
    }

    pub fn with_hooks(mut self, hooks: TrackerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn set_hooks(&mut self, hooks: TrackerHooks) { self.hooks = hooks; }

    /// Position options take effect on the next start.
    pub fn configure(&mut self, opts: TrackerOptions) {
        self.config.apply(opts);
        self.emitter.set_interval_ms(self.config.send_interval_ms);
    }

    pub fn config(&self) -> &TrackerConfig { &self.config }
    pub fn state(&self) -> SessionState { self.state }
    pub fn is_tracking(&self) -> bool { self.state != SessionState::Idle }
    pub fn is_paused(&self) -> bool { self.state == SessionState::Paused }
    pub fn is_subscribed(&self) -> bool { self.subscription.is_some() }

    pub fn current_position(&self) -> Option<&PositionSample> { self.track.current() }
    pub fn previous_position(&self) -> Option<&PositionSample> { self.track.previous() }
    pub fn last_error(&self) -> Option<&PositionError> { self.last_error.as_ref() }
    pub fn heading_deg(&self) -> Option<f64> { self.motion.heading_deg() }
    pub fn speed_kph(&self) -> f64 { self.motion.speed_kph() }
    pub fn accuracy_m(&self) -> Option<f64> { self.accuracy_m }
    pub fn altitude_m(&self) -> Option<f64> { self.altitude_m }
    pub fn distance_m(&self) -> f64 { self.track.distance_m() }
    pub fn avg_speed_kph(&self) -> f64 { self.track.avg_speed_kph() }
    pub fn max_speed_kph(&self) -> f64 { self.track.max_speed_kph() }
    pub fn duration_ms(&self) -> u64 { self.track.duration_ms() }
    pub fn last_update_ms(&self) -> Option<u64> { self.track.last_update_ms() }
    pub fn path(&self) -> &[PathPoint] { self.track.path() }
    pub fn telemetry_log(&self) -> &[TelemetryRecord] { self.emitter.log() }
    pub fn delivery_stats(&self) -> DeliveryStats { self.emitter.stats() }

    pub fn quality(&self) -> Option<QualityTier> {
        self.accuracy_m.map(|a| classify_accuracy(a, AccuracyScale::Engine))
    }

    pub fn display_quality(&self) -> Option<QualityTier> {
        self.accuracy_m.map(|a| classify_accuracy(a, AccuracyScale::Display))
    }

    pub fn summary(&self) -> TrackSummary {
        self.track.summary(self.emitter.log().len())
    }

    pub async fn start(&mut self) -> Result<(), TrackerError> {
        if self.state != SessionState::Idle {
            return Err(TrackerError::InvalidTransition { action: "start", state: self.state });
        }
        if !self.source.is_available() {
            let e = PositionError::NotSupported;
            self.handle_error(e.clone());
            return Err(e.into());
        }

        // the first fix of every session opens a new leg
        self.track.restart();
        self.motion.reset();
        self.last_error = None;
        self.state = SessionState::Tracking;
        tracing::info!(
            operation_id = ?self.config.operation_id,
            vehicle_id = ?self.config.vehicle_id,
            "tracking started"
        );

        match self.source.current_position(&self.config.position).await {
            Ok(s) => self.handle_sample(s),
            Err(e) => self.handle_error(e),
        }
        // a fatal answer to the first request already stopped us
        if self.state == SessionState::Idle {
            let e = self.last_error.clone().unwrap_or(PositionError::NotSupported);
            return Err(e.into());
        }

        self.subscribe();
        Ok(())
    }

    fn subscribe(&mut self) {
        let (tx, rx) = channel();
        let source = self.source.clone();
        let opts = self.config.position.clone();
        let task = tokio::spawn(async move {
            let err_tx = tx.clone();
            if let Err(e) = source.watch(opts, tx).await {
                let _ = err_tx.send(Err(e));
            }
        });
        self.subscription = Some(Subscription { task, events: rx });
    }

    pub fn pause(&mut self) -> Result<(), TrackerError> {
        if self.state != SessionState::Tracking {
            return Err(TrackerError::InvalidTransition { action: "pause", state: self.state });
        }
        self.state = SessionState::Paused;
        tracing::info!("tracking paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), TrackerError> {
        if self.state != SessionState::Paused {
            return Err(TrackerError::InvalidTransition { action: "resume", state: self.state });
        }
        self.state = SessionState::Tracking;
        tracing::info!("tracking resumed");
        Ok(())
    }

    /// Close the subscription and return to idle. No-op when already idle.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.subscription = None;
        self.track.end();
        self.state = SessionState::Idle;
        tracing::info!(
            distance_m = self.track.distance_m(),
            records = self.emitter.log().len(),
            "tracking stopped"
        );
    }

    /// Drop the accumulated track and telemetry log. Lifecycle state is kept.
    pub fn clear(&mut self) {
        self.motion.reset();
        self.track.reset();
        self.emitter.clear();
        self.last_error = None;
        self.accuracy_m = None;
        self.altitude_m = None;
        tracing::info!(state = %self.state, "track cleared");
    }

    /// Process whatever the subscription has delivered so far.
    pub fn poll(&mut self) -> usize {
        let mut n = 0;
        while let Some(ev) = self.subscription.as_ref().and_then(|s| s.events.try_recv().ok()) {
            self.handle_event(ev);
            n += 1;
        }
        n
    }

    pub fn handle_event(&mut self, ev: PositionEvent) {
        match ev {
            Ok(s) => self.handle_sample(s),
            Err(e) => self.handle_error(e),
        }
    }

    fn handle_sample(&mut self, s: PositionSample) {
        if !is_valid_coordinate(s.lat, s.lng) {
            tracing::warn!(lat = s.lat, lng = s.lng, "dropping sample with invalid coordinates");
            return;
        }

        match self.state {
            SessionState::Idle => {
                tracing::debug!(ts = s.timestamp_ms, "sample ignored while idle");
                return;
            }
            SessionState::Paused => {
                self.track.observe(&s);
                self.update_live(&s);
                return;
            }
            SessionState::Tracking => {}
        }

        self.update_live(&s);
        let (old_speed, old_heading) = (self.motion.speed_kph(), self.motion.heading_deg());

        let point = match self.track.current().cloned() {
            None => {
                self.motion.seed(&s);
                let point = self.path_point(&s);
                self.track.seed(&s, point.clone());
                point
            }
            Some(prev) => {
                let m = self.motion.update(&prev, &s);
                let point = self.path_point(&s);
                let moved = self.track.advance(&s, &m, point.clone());
                if self.config.enable_logging {
                    tracing::debug!(
                        distance_m = m.distance_m,
                        speed_kph = m.speed_kph,
                        smoothed_speed_kph = m.smoothed_speed_kph,
                        heading_deg = ?m.smoothed_heading_deg,
                        moved,
                        total_m = self.track.distance_m(),
                        "position update"
                    );
                }
                point
            }
        };

        let speed = self.motion.speed_kph();
        if speed != old_speed {
            if let Some(f) = self.hooks.on_speed_change.as_mut() {
                f(speed);
            }
        }
        if let Some(h) = self.motion.heading_deg() {
            if Some(h) != old_heading {
                if let Some(f) = self.hooks.on_heading_change.as_mut() {
                    f(h);
                }
            }
        }

        let record = TelemetryRecord::new(
            self.config.operation_id.clone(),
            self.config.vehicle_id.clone(),
            &point,
            s.altitude_m,
        );
        self.emitter.emit(record);
    }

    /// Live readings shared by tracking and paused samples.
    fn update_live(&mut self, s: &PositionSample) {
        if self.accuracy_m != Some(s.accuracy_m) {
            self.accuracy_m = Some(s.accuracy_m);
            if let Some(f) = self.hooks.on_accuracy_change.as_mut() {
                f(s.accuracy_m, classify_accuracy(s.accuracy_m, AccuracyScale::Engine));
            }
        }
        self.altitude_m = s.altitude_m;
        if let Some(f) = self.hooks.on_position.as_mut() {
            f(s);
        }
    }

    fn path_point(&self, s: &PositionSample) -> PathPoint {
        PathPoint {
            lat: s.lat,
            lng: s.lng,
            speed_kph: self.motion.speed_kph(),
            heading_deg: self.motion.heading_deg(),
            accuracy_m: s.accuracy_m,
            timestamp_ms: s.timestamp_ms,
        }
    }

    fn handle_error(&mut self, e: PositionError) {
        let message = e.user_message();
        tracing::warn!(error = %e, "positioning failed");
        if let Some(f) = self.hooks.on_error.as_mut() {
            f(&e, message);
        }
        let fatal = e.is_fatal();
        self.last_error = Some(e);
        if fatal {
            self.stop();
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let geo = |s: &PositionSample| GeoPoint { lat: s.lat, lng: s.lng };
        TrackerSnapshot {
            state: self.state,
            is_tracking: self.is_tracking(),
            is_paused: self.is_paused(),
            current_position: self.track.current().map(geo),
            previous_position: self.track.previous().map(geo),
            last_error: self.last_error.as_ref().map(|e| e.user_message().to_string()),
            accuracy_m: self.accuracy_m,
            altitude_m: self.altitude_m,
            heading_deg: self.motion.heading_deg(),
            speed_kph: self.motion.speed_kph(),
            quality: self.quality(),
            display_quality: self.display_quality(),
            summary: self.summary(),
            started_at_ms: self.track.started_at_ms(),
            last_update_ms: self.track.last_update_ms(),
            delivery: self.emitter.stats(),
        }
    }

    pub fn export(&self) -> Result<TrackExport, TrackerError> {
        Ok(TrackExport {
            exported_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            operation_id: self.config.operation_id.clone(),
            vehicle_id: self.config.vehicle_id.clone(),
            summary: self.summary(),
            path: self.track.path().to_vec(),
            telemetry: self.emitter.log().to_vec(),
        })
    }

    /// Bulk re-send of the local log. Unlike live delivery, the outcome is returned.
    pub async fn resend_log(&self) -> Result<usize, TrackerError> {
        Ok(self.emitter.resend().await?)
    }
}
