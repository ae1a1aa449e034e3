//! Real-time position tracking for haul trucks: smoothing, distance
//! accumulation and telemetry hand-off on top of a [`PositionSource`].
//!
//! [`PositionSource`]: haul_track_core::PositionSource

pub mod accumulator;
pub mod config;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod motion;
pub mod session;

pub use config::{TrackerConfig, TrackerHooks, TrackerOptions};
pub use emitter::DeliveryStats;
pub use error::TrackerError;
pub use logging::{init_logging, LogLevel};
pub use session::{SessionState, Tracker, TrackerSnapshot};
