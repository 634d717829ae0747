use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::geofence::GeoPoint;

/// An ephemeral position sample for one vehicle. Each poll cycle fully
/// replaces the previous set; nothing is retained client-side beyond the
/// current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub updated_at: DateTime<Utc>,
}

impl VehicleLocation {
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
