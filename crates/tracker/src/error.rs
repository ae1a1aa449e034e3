use haul_track_core::{DeliveryError, PositionError};

use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: SessionState },
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
}
