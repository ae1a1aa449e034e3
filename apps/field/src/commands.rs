use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use haul_track_core::{PositionSample, PositionSource, ReplaySource, TelemetrySink};
use haul_track_udp::{UdpPositionSource, UdpSourceConfig};
use haul_tracker::{Tracker, TrackerConfig, TrackerHooks, TrackerOptions};
use haul_uplink::{HttpTelemetrySink, UplinkConfig};
use model::TelemetryRecord;

const POLL_EVERY: Duration = Duration::from_millis(200);

pub struct TrackArgs {
    pub bind: String,
    pub uplink: Option<String>,
    pub resend: bool,
    pub out_dir: Option<PathBuf>,
    pub status_every: u64,
}

/// Defaults, then the options file, then command-line ids.
pub fn load_config(
    options: Option<&Path>,
    operation_id: Option<String>,
    vehicle_id: Option<String>,
) -> Result<TrackerConfig> {
    let mut cfg = TrackerConfig::default();
    if let Some(p) = options {
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let opts = TrackerOptions::from_json(&text).with_context(|| format!("parsing {}", p.display()))?;
        cfg.apply(opts);
    }
    cfg.apply(TrackerOptions { operation_id, vehicle_id, ..Default::default() });
    Ok(cfg)
}

fn hooks() -> TrackerHooks {
    TrackerHooks::default()
        .on_error(|_, msg| eprintln!("{msg}"))
        .on_accuracy_change(|acc, tier| tracing::debug!(accuracy_m = acc, tier = tier.as_str(), "accuracy changed"))
}

pub async fn track(cfg: TrackerConfig, args: TrackArgs) -> Result<()> {
    let source: Arc<dyn PositionSource> = Arc::new(UdpPositionSource::new(UdpSourceConfig { bind_addr: args.bind }));
    let sink = match args.uplink {
        Some(base_url) => {
            let s = HttpTelemetrySink::new(UplinkConfig { base_url, ..Default::default() })
                .context("setting up telemetry uplink")?;
            Some(Arc::new(s) as Arc<dyn TelemetrySink>)
        }
        None => None,
    };

    let mut tracker = Tracker::new(source, sink, cfg).with_hooks(hooks());
    tracker.start().await.context("starting tracker")?;

    let mut poll = tokio::time::interval(POLL_EVERY);
    let mut status = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = poll.tick() => {
                tracker.poll();
                if !tracker.is_tracking() {
                    tracing::warn!("tracking ended by the positioning source");
                    break;
                }
            }
            _ = status.tick() => {
                let snap = tracker.snapshot();
                tracing::info!(
                    state = %snap.state,
                    distance_m = snap.summary.distance_m,
                    speed_kph = snap.speed_kph,
                    quality = snap.display_quality.map(|q| q.as_str()).unwrap_or("none"),
                    delivered = snap.delivery.delivered,
                    failed = snap.delivery.failed,
                    "status"
                );
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
        }
    }
    tracker.stop();

    if args.resend {
        match tracker.resend_log().await {
            Ok(n) => tracing::info!(count = n, "telemetry log re-sent"),
            Err(e) => tracing::warn!(error = %e, "bulk re-send failed, export kept locally"),
        }
    }

    let dir = match args.out_dir {
        Some(d) => d,
        None => dirs_next::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("haul-field"),
    };
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let export = tracker.export()?;
    let file = dir.join(format!("track-{}.json", export.exported_at.replace(':', "")));
    iox::write_export_json(&export, &file)?;
    println!("{}", file.display());
    Ok(())
}

pub async fn replay(
    cfg: TrackerConfig,
    input: &Path,
    out: Option<PathBuf>,
    csv: Option<PathBuf>,
    reported: bool,
) -> Result<()> {
    let records = iox::import_telemetry_ndjson(input)?;
    let mut samples = records.iter().map(|r| sample_from_record(r, reported));
    let Some(first) = samples.next() else {
        bail!("{} holds no telemetry records", input.display());
    };
    let rest: Vec<PositionSample> = samples.collect();
    let expected = rest.len();

    let source = ReplaySource::from_samples(rest).with_initial(Ok(first));
    let mut tracker = Tracker::new(Arc::new(source), None, cfg).with_hooks(hooks());
    tracker.start().await.context("starting replay")?;

    let mut processed = 0;
    while processed < expected && tracker.is_tracking() {
        processed += tracker.poll();
        tokio::task::yield_now().await;
    }
    tracker.stop();

    let export = tracker.export()?;
    let out = out.unwrap_or_else(|| input.with_extension("export.json"));
    iox::write_export_json(&export, &out)?;
    if let Some(csv) = csv {
        iox::export_path_csv(&export.path, &csv)?;
    }
    println!("{}", serde_json::to_string_pretty(&export.summary)?);
    Ok(())
}

/// Recorded speed is km/h; sources report m/s.
fn sample_from_record(r: &TelemetryRecord, reported: bool) -> PositionSample {
    let mut s = PositionSample::new(r.latitude, r.longitude, r.accuracy, r.timestamp);
    s.altitude_m = r.altitude;
    if reported {
        s.speed_mps = Some(r.speed / 3.6);
        s.heading_deg = r.heading;
    }
    s
}
