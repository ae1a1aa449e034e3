use std::io::Cursor;

use anyhow::Context;
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use haul_track_core::*;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpSourceConfig {
    pub bind_addr: String,       // e.g. "0.0.0.0:5790"
}

impl Default for UdpSourceConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:5790".into() }
    }
}

/// Receives fixes pushed by the on-board GNSS bridge as small binary datagrams.
pub struct UdpPositionSource {
    cfg: UdpSourceConfig,
}

impl UdpPositionSource {
    pub fn new(cfg: UdpSourceConfig) -> Self { Self { cfg } }

    async fn bind(&self) -> Result<UdpSocket, PositionError> {
        UdpSocket::bind(&self.cfg.bind_addr)
            .await
            .with_context(|| format!("bind {}", self.cfg.bind_addr))
            .map_err(|e| PositionError::PositionUnavailable(format!("{e:#}")))
    }
}

#[async_trait::async_trait]
impl PositionSource for UdpPositionSource {
    async fn current_position(&self, opts: &PositionOptions) -> Result<PositionSample, PositionError> {
        let socket = self.bind().await?;
        let mut buf = vec![0u8; 256];
        let wait = async {
            loop {
                let (len, _peer) = socket
                    .recv_from(&mut buf)
                    .await
                    .map_err(|e| PositionError::PositionUnavailable(e.to_string()))?;
                match decode_datagram(&buf[..len]) {
                    Ok(ev) => return ev,
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed position datagram"),
                }
            }
        };
        tokio::time::timeout(opts.timeout(), wait)
            .await
            .map_err(|_| PositionError::Timeout)?
    }

    async fn watch(&self, _opts: PositionOptions, tx: PositionTx) -> Result<(), PositionError> {
        let socket = self.bind().await?;
        let mut buf = vec![0u8; 256];
        loop {
            let (len, peer) = socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| PositionError::PositionUnavailable(e.to_string()))?;
            let ev = match decode_datagram(&buf[..len]) {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::warn!(error = %e, %peer, "ignoring malformed position datagram");
                    continue;
                }
            };
            if tx.send(ev).is_err() {
                return Ok(());
            }
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic {0:#06x}")]
    BadMagic(u16),
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),
}

// Wire layout, little endian:
//   magic u16 | kind u8 | flags u8 | timestamp_ms u64
//   kind 0 (fix):   lat f64 | lng f64 | accuracy f32 | altitude f32 | speed f32 | heading f32
//   kind 1 (error): code u8
const MAGIC: u16 = 0x4854;
const KIND_FIX: u8 = 0;
const KIND_ERROR: u8 = 1;
const HEADER_LEN: usize = 12;
const FIX_LEN: usize = HEADER_LEN + 32;

const FLAG_ALTITUDE: u8 = 0b001;
const FLAG_SPEED: u8 = 0b010;
const FLAG_HEADING: u8 = 0b100;

const ERR_DENIED: u8 = 1;
const ERR_UNAVAILABLE: u8 = 2;
const ERR_TIMEOUT: u8 = 3;

pub fn decode_datagram(buf: &[u8]) -> Result<PositionEvent, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(buf.len()));
    }
    let mut c = Cursor::new(buf);
    let truncated = |_| DecodeError::Truncated(buf.len());

    let magic = c.read_u16::<LittleEndian>().map_err(truncated)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let kind = c.read_u8().map_err(truncated)?;
    let flags = c.read_u8().map_err(truncated)?;
    let timestamp_ms = c.read_u64::<LittleEndian>().map_err(truncated)?;

    match kind {
        KIND_FIX => {
            if buf.len() < FIX_LEN {
                return Err(DecodeError::Truncated(buf.len()));
            }
            let lat = c.read_f64::<LittleEndian>().map_err(truncated)?;
            let lng = c.read_f64::<LittleEndian>().map_err(truncated)?;
            let accuracy = c.read_f32::<LittleEndian>().map_err(truncated)?;
            let altitude = c.read_f32::<LittleEndian>().map_err(truncated)?;
            let speed = c.read_f32::<LittleEndian>().map_err(truncated)?;
            let heading = c.read_f32::<LittleEndian>().map_err(truncated)?;
            Ok(Ok(PositionSample {
                lat,
                lng,
                accuracy_m: accuracy as f64,
                altitude_m: (flags & FLAG_ALTITUDE != 0).then_some(altitude as f64),
                speed_mps: (flags & FLAG_SPEED != 0).then_some(speed as f64),
                heading_deg: (flags & FLAG_HEADING != 0).then_some(heading as f64),
                timestamp_ms,
            }))
        }
        KIND_ERROR => {
            let code = c.read_u8().map_err(truncated)?;
            let err = match code {
                ERR_DENIED => PositionError::PermissionDenied,
                ERR_UNAVAILABLE => PositionError::PositionUnavailable("reported by receiver".into()),
                ERR_TIMEOUT => PositionError::Timeout,
                other => return Err(DecodeError::UnknownErrorCode(other)),
            };
            Ok(Err(err))
        }
        other => Err(DecodeError::UnknownKind(other)),
    }
}

/// Encode a fix in the receiver's wire format (used by the bridge simulator).
pub fn encode_fix(s: &PositionSample) -> Bytes {
    let mut flags = 0u8;
    if s.altitude_m.is_some() { flags |= FLAG_ALTITUDE; }
    if s.speed_mps.is_some() { flags |= FLAG_SPEED; }
    if s.heading_deg.is_some() { flags |= FLAG_HEADING; }

    let mut b = BytesMut::with_capacity(FIX_LEN);
    b.put_u16_le(MAGIC);
    b.put_u8(KIND_FIX);
    b.put_u8(flags);
    b.put_u64_le(s.timestamp_ms);
    b.put_f64_le(s.lat);
    b.put_f64_le(s.lng);
    b.put_f32_le(s.accuracy_m as f32);
    b.put_f32_le(s.altitude_m.unwrap_or(0.0) as f32);
    b.put_f32_le(s.speed_mps.unwrap_or(0.0) as f32);
    b.put_f32_le(s.heading_deg.unwrap_or(0.0) as f32);
    b.freeze()
}

pub fn encode_error(err: &PositionError, timestamp_ms: u64) -> Bytes {
    let code = match err {
        PositionError::PermissionDenied => ERR_DENIED,
        PositionError::Timeout => ERR_TIMEOUT,
        PositionError::PositionUnavailable(_) | PositionError::NotSupported => ERR_UNAVAILABLE,
    };
    let mut b = BytesMut::with_capacity(HEADER_LEN + 1);
    b.put_u16_le(MAGIC);
    b.put_u8(KIND_ERROR);
    b.put_u8(0);
    b.put_u64_le(timestamp_ms);
    b.put_u8(code);
    b.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fix_with_optional_fields() {
        let s = PositionSample::new(34.0001, 135.0, 4.5, 1_700_000_000_123).with_speed(11.0);
        let ev = decode_datagram(&encode_fix(&s)).unwrap().unwrap();
        assert_eq!(ev.lat, 34.0001);
        assert_eq!(ev.lng, 135.0);
        assert_eq!(ev.timestamp_ms, 1_700_000_000_123);
        assert_eq!(ev.speed_mps, Some(11.0));
        assert_eq!(ev.heading_deg, None);
        assert_eq!(ev.altitude_m, None);
    }

    #[test]
    fn decodes_error_datagram() {
        let ev = decode_datagram(&encode_error(&PositionError::PermissionDenied, 5)).unwrap();
        assert_eq!(ev, Err(PositionError::PermissionDenied));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode_datagram(&[0u8; 4]), Err(DecodeError::Truncated(4)));
        let mut bad = encode_fix(&PositionSample::new(0.0, 0.0, 1.0, 0)).to_vec();
        bad[0] = 0;
        assert!(matches!(decode_datagram(&bad), Err(DecodeError::BadMagic(_))));
        let full = encode_fix(&PositionSample::new(0.0, 0.0, 1.0, 0));
        assert_eq!(decode_datagram(&full[..20]), Err(DecodeError::Truncated(20)));
    }

    #[tokio::test]
    async fn watch_forwards_datagrams() {
        let cfg = UdpSourceConfig { bind_addr: "127.0.0.1:0".into() };
        // bind first to learn a free port, then hand it to the source
        let probe = std::net::UdpSocket::bind(&cfg.bind_addr).unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let src = UdpPositionSource::new(UdpSourceConfig { bind_addr: addr.to_string() });
        let (tx, rx) = channel();
        let task = tokio::spawn(async move { src.watch(PositionOptions::default(), tx).await });

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fix = PositionSample::new(34.0, 135.0, 3.0, 42);
        let mut got = None;
        for _ in 0..50 {
            sender.send_to(&encode_fix(&fix), addr).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if let Ok(ev) = rx.try_recv() {
                got = Some(ev);
                break;
            }
        }
        task.abort();
        assert_eq!(got, Some(Ok(fix)));
    }
}
