use std::sync::Arc;

use haul_track_core::{DeliveryError, TelemetrySink};
use model::TelemetryRecord;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Keeps every record locally and forwards a throttled subset to the sink.
///
/// Delivery runs on detached tasks; results only land in [`DeliveryStats`].
pub struct TelemetryEmitter {
    sink: Option<Arc<dyn TelemetrySink>>,
    interval_ms: u64,
    last_attempt_ms: Option<u64>,
    log: Vec<TelemetryRecord>,
    stats: Arc<Mutex<DeliveryStats>>,
}

impl TelemetryEmitter {
    pub fn new(sink: Option<Arc<dyn TelemetrySink>>, interval_ms: u64) -> Self {
        Self {
            sink,
            interval_ms,
            last_attempt_ms: None,
            log: Vec::new(),
            stats: Arc::new(Mutex::new(DeliveryStats::default())),
        }
    }

    pub fn log(&self) -> &[TelemetryRecord] { &self.log }
    pub fn stats(&self) -> DeliveryStats { *self.stats.lock() }
    pub fn set_interval_ms(&mut self, ms: u64) { self.interval_ms = ms; }

    pub fn emit(&mut self, record: TelemetryRecord) {
        let due = match self.last_attempt_ms {
            None => true,
            Some(last) => record.timestamp.saturating_sub(last) >= self.interval_ms,
        };
        if due {
            if let Some(sink) = &self.sink {
                self.last_attempt_ms = Some(record.timestamp);
                dispatch(sink.clone(), record.clone(), self.stats.clone());
            }
        }
        self.log.push(record);
    }

    /// Push the whole local log in one batch (offline resync).
    pub async fn resend(&self) -> Result<usize, DeliveryError> {
        let Some(sink) = &self.sink else {
            return Err(DeliveryError::Msg("no telemetry endpoint configured".into()));
        };
        sink.send_batch(&self.log).await?;
        tracing::info!(count = self.log.len(), "telemetry log re-sent");
        Ok(self.log.len())
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.last_attempt_ms = None;
    }
}

fn dispatch(sink: Arc<dyn TelemetrySink>, record: TelemetryRecord, stats: Arc<Mutex<DeliveryStats>>) {
    stats.lock().attempted += 1;
    let Ok(rt) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(id = %record.id, "no async runtime, telemetry delivery skipped");
        stats.lock().failed += 1;
        return;
    };
    rt.spawn(async move {
        match sink.send(&record).await {
            Ok(()) => stats.lock().delivered += 1,
            Err(e) => {
                tracing::warn!(error = %e, id = %record.id, "telemetry delivery failed");
                stats.lock().failed += 1;
            }
        }
    });
}
