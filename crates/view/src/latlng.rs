use std::f64::consts::PI;

use render_protocol::WorldPoint;

use crate::{TransformError, checked_finite};

/// Latitude where Web-Mercator turns the world into a square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, TransformError> {
        let latitude = checked_finite(latitude)?;
        let longitude = checked_finite(longitude)?;
        if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
            return Err(TransformError::InvalidCoordinate);
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Projects into normalized world space; latitudes beyond
    /// `MAX_LATITUDE` are clamped.
    pub fn to_world(&self) -> WorldPoint {
        let latitude = self.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let x = (self.longitude + 180.0) / 360.0;
        let y_degrees = (180.0 / PI) * (PI / 4.0 + latitude * PI / 360.0).tan().ln();
        let y = (180.0 - y_degrees) / 360.0;
        WorldPoint { x, y }
    }

    pub fn from_world(point: WorldPoint) -> Self {
        let longitude = point.x * 360.0 - 180.0;
        let y_degrees = 180.0 - point.y * 360.0;
        let latitude = 360.0 / PI * (y_degrees * PI / 180.0).exp().atan() - 90.0;
        Self {
            latitude,
            longitude,
        }
    }
}
