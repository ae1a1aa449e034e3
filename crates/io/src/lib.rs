use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use serde::{Deserialize, Serialize};
use model::*;

pub fn write_export_json(export: &TrackExport, path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, export)?;
    w.flush()?;
    Ok(())
}

pub fn read_export_json(path: &Path) -> Result<TrackExport> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let export = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing export {}", path.display()))?;
    Ok(export)
}

/// One record per line, in the backend's wire shape.
pub fn export_telemetry_ndjson(records: &[TelemetryRecord], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for r in records {
        let s = serde_json::to_string(r)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

/// Blank lines are skipped. A malformed line fails the whole import with its line number.
pub fn import_telemetry_ndjson(path: &Path) -> Result<Vec<TelemetryRecord>> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = vec![];
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        let r: TelemetryRecord = serde_json::from_str(&s)
            .with_context(|| format!("{}:{}: bad telemetry record", path.display(), i + 1))?;
        records.push(r);
    }
    Ok(records)
}

pub fn export_path_csv(path_points: &[PathPoint], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for p in path_points {
        w.serialize(CsvRow {
            timestamp_ms: p.timestamp_ms,
            lat: p.lat,
            lng: p.lng,
            speed_kph: p.speed_kph,
            heading_deg: p.heading_deg,
            accuracy_m: p.accuracy_m,
        })?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_path_csv(path: &Path) -> Result<Vec<PathPoint>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut points = vec![];
    for rec in rdr.deserialize() {
        let r: CsvRow = rec?;
        points.push(PathPoint {
            lat: r.lat,
            lng: r.lng,
            speed_kph: r.speed_kph,
            heading_deg: r.heading_deg,
            accuracy_m: r.accuracy_m,
            timestamp_ms: r.timestamp_ms,
        });
    }
    Ok(points)
}

#[derive(Serialize, Deserialize)]
struct CsvRow {
    timestamp_ms: u64,
    lat: f64,
    lng: f64,
    speed_kph: f64,
    // empty cell while no heading has been established
    heading_deg: Option<f64>,
    accuracy_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn point(ts: u64, heading: Option<f64>) -> PathPoint {
        PathPoint { lat: 34.0 + ts as f64 / 8_000.0, lng: 135.0, speed_kph: 32.5, heading_deg: heading, accuracy_m: 6.0, timestamp_ms: ts }
    }

    fn export() -> TrackExport {
        let path = vec![point(1_000, None), point(2_000, Some(4.5))];
        let telemetry = path
            .iter()
            .map(|p| TelemetryRecord::new(Some("op-7".into()), Some("DT-03".into()), p, Some(112.0)))
            .collect();
        TrackExport {
            exported_at: "2026-10-16T08:00:00Z".into(),
            operation_id: Some("op-7".into()),
            vehicle_id: Some("DT-03".into()),
            summary: TrackSummary { distance_m: 11.1, point_count: 2, record_count: 2, ..Default::default() },
            path,
            telemetry,
        }
    }

    #[test]
    fn export_json_reads_back() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.json");
        let ex = export();
        write_export_json(&ex, &file).unwrap();
        assert_eq!(read_export_json(&file).unwrap(), ex);
    }

    #[test]
    fn ndjson_keeps_record_ids_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("telemetry.ndjson");
        let ex = export();
        export_telemetry_ndjson(&ex.telemetry, &file).unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"vehicleId\":\"DT-03\""));
        std::fs::write(&file, format!("{text}\n\n")).unwrap();

        let back = import_telemetry_ndjson(&file).unwrap();
        assert_eq!(back, ex.telemetry);
    }

    #[test]
    fn bad_ndjson_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.ndjson");
        std::fs::write(&file, "{\"nope\":1}\n").unwrap();
        let err = import_telemetry_ndjson(&file).unwrap_err();
        assert!(format!("{err:#}").contains(":1:"));
    }

    #[test]
    fn path_csv_has_empty_heading_until_known() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("path.csv");
        let ex = export();
        export_path_csv(&ex.path, &file).unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp_ms,lat,lng,speed_kph,heading_deg,accuracy_m"));
        assert!(lines.next().unwrap().contains(",,"));

        assert_eq!(import_path_csv(&file).unwrap(), ex.path);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_export_json(Path::new("/nonexistent/track.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/track.json"));
    }
}
