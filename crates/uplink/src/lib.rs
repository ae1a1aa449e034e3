//! HTTP delivery of telemetry records to the fleet backend.

use std::time::Duration;

use haul_track_core::{DeliveryError, TelemetrySink};
use model::TelemetryRecord;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Base URL of the fleet API, e.g. "https://fleet.example.com/api".
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:8080/api".into(), timeout_ms: 5_000 }
    }
}

impl UplinkConfig {
    pub fn record_url(&self) -> String {
        format!("{}/telemetry", self.base_url.trim_end_matches('/'))
    }

    pub fn bulk_url(&self) -> String {
        format!("{}/telemetry/bulk", self.base_url.trim_end_matches('/'))
    }
}

/// Posts records as JSON. Single records go to `/telemetry`, batches go to
/// `/telemetry/bulk` as a bare array.
pub struct HttpTelemetrySink {
    cfg: UplinkConfig,
    http: reqwest::Client,
}

impl HttpTelemetrySink {
    pub fn new(cfg: UplinkConfig) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| DeliveryError::Msg(format!("http client: {e}")))?;
        Ok(Self { cfg, http })
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn send(&self, record: &TelemetryRecord) -> Result<(), DeliveryError> {
        self.post(&self.cfg.record_url(), record).await?;
        tracing::trace!(id = %record.id, "telemetry record delivered");
        Ok(())
    }

    async fn send_batch(&self, records: &[TelemetryRecord]) -> Result<(), DeliveryError> {
        if records.is_empty() {
            return Ok(());
        }
        self.post(&self.cfg.bulk_url(), records).await?;
        tracing::debug!(count = records.len(), "telemetry batch delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::PathPoint;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn record() -> TelemetryRecord {
        let p = PathPoint {
            lat: 34.0,
            lng: 135.0,
            speed_kph: 20.0,
            heading_deg: Some(10.0),
            accuracy_m: 5.0,
            timestamp_ms: 1,
        };
        TelemetryRecord::new(Some("op".into()), Some("v1".into()), &p, None)
    }

    /// Serves one request with the given status and hands back the raw request.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&req).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let len = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let l = l.to_ascii_lowercase();
                            l.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if req.len() >= head_end + 4 + len {
                        break;
                    }
                }
            }
            let resp = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            sock.write_all(resp.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&req).to_string()
        });
        (base, handle)
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let cfg = UplinkConfig { base_url: "https://fleet.test/api/".into(), timeout_ms: 10 };
        assert_eq!(cfg.record_url(), "https://fleet.test/api/telemetry");
        assert_eq!(cfg.bulk_url(), "https://fleet.test/api/telemetry/bulk");
    }

    #[tokio::test]
    async fn posts_single_record() {
        let (base, server) = one_shot_server("200 OK").await;
        let sink = HttpTelemetrySink::new(UplinkConfig { base_url: base, timeout_ms: 2_000 }).unwrap();
        sink.send(&record()).await.unwrap();
        let req = server.await.unwrap();
        assert!(req.starts_with("POST /api/telemetry HTTP/1.1"));
        assert!(req.contains("\"operationId\":\"op\""));
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let (base, server) = one_shot_server("500 Internal Server Error").await;
        let sink = HttpTelemetrySink::new(UplinkConfig { base_url: base, timeout_ms: 2_000 }).unwrap();
        let err = sink.send_batch(&[record(), record()]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(500)));
        let req = server.await.unwrap();
        assert!(req.starts_with("POST /api/telemetry/bulk HTTP/1.1"));
    }

    #[tokio::test]
    async fn batch_body_is_an_array_of_records() {
        let (base, server) = one_shot_server("202 Accepted").await;
        let sink = HttpTelemetrySink::new(UplinkConfig { base_url: base, timeout_ms: 2_000 }).unwrap();
        sink.send_batch(&[record(), record()]).await.unwrap();
        let req = server.await.unwrap();
        let body = &req[req.find("\r\n\r\n").unwrap() + 4..];
        let v: serde_json::Value = serde_json::from_str(body).unwrap();
        let arr = v.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["vehicleId"], "v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let cfg = UplinkConfig { base_url: format!("http://{addr}"), timeout_ms: 1_000 };
        let sink = HttpTelemetrySink::new(cfg).unwrap();
        let err = sink.send(&record()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable(_)));
    }
}
