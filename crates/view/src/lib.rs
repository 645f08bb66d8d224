//! Camera state for the map.
//!
//! - `latlng`: geographic coordinates and the Web-Mercator projection.
//! - `transition`: eased, time-bounded camera animations.
//! - `transform`: the mutable camera owned by the map session.
//! - `tile_math`: matrices and bounds derived from a frame snapshot.

mod latlng;
mod tile_math;
mod transform;
mod transition;

use std::fmt;

pub use latlng::{LatLng, MAX_LATITUDE};
pub use tile_math::{
    TILE_SIZE, covering_zoom, pattern_matrix, tile_matrix, translated_matrix, visible_bounds,
};
pub use transform::{InteractionFlags, MapTransform, ScreenPoint, TransformState};
pub use transition::{CameraTarget, CameraTransition, UnitBezier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformError {
    InvalidZoom,
    InvalidZoomRange,
    InvalidSize,
    InvalidCoordinate,
    NonFiniteValue,
}

impl fmt::Display for TransformError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidZoom => write!(formatter, "zoom must be a finite number"),
            Self::InvalidZoomRange => write!(formatter, "min zoom must not exceed max zoom"),
            Self::InvalidSize => write!(
                formatter,
                "viewport size and pixel ratio must be positive and finite"
            ),
            Self::InvalidCoordinate => write!(formatter, "latitude or longitude out of range"),
            Self::NonFiniteValue => write!(formatter, "camera input is not finite"),
        }
    }
}

impl std::error::Error for TransformError {}

fn checked_finite(value: f64) -> Result<f64, TransformError> {
    if !value.is_finite() {
        return Err(TransformError::NonFiniteValue);
    }
    Ok(value)
}

fn checked_add(current: f64, delta: f64) -> Result<f64, TransformError> {
    let next = checked_finite(current)? + checked_finite(delta)?;
    checked_finite(next)
}
