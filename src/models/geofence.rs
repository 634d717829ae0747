use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A coordinate in degrees. Field names match the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Wire representation of a geofence shape.
///
/// A geofence is either a valid circle (radius > 0, meters) or a valid
/// polygon (>= 3 points); never both, never neither. The codec in
/// `geometry::codec` is the only place that constructs or validates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Circle { center: GeoPoint, radius: f64 },
    Polygon { points: Vec<GeoPoint> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceStatus {
    Active,
    Inactive,
    Draft,
    Restricted,
}

/// A named spatial boundary as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Open-ended category tag (`depot`, `restricted`, `customer`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub status: GeofenceStatus,
    pub geometry: Geometry,
    /// Opaque bag of operational attributes, passed through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for create/update; no `id` until the server assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: GeofenceStatus,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
