use tracing::warn;

use crate::geometry::codec::ShapeModel;
use crate::models::geofence::GeoPoint;

/// The map library fires separate callbacks for circle, polygon and
/// rectangle shapes, each with its own payload layout. This enum is the
/// single normalized form those callbacks are funneled into before the
/// rest of the client sees them.
///
/// Polygons carry a list of rings; only the first ring (the outer
/// boundary) is used. Holes are not supported.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShapeEvent {
    Circle {
        center: GeoPoint,
        radius_meters: f64,
    },
    Polygon {
        rings: Vec<Vec<GeoPoint>>,
    },
    Rectangle {
        south_west: GeoPoint,
        north_east: GeoPoint,
    },
}

/// Normalize a finalized draw/edit event into the codec's editing model.
///
/// This is the single entry point for both "created" and "edited" map
/// callbacks. It has no side effects and never touches the network, which
/// is what lets the reconciliation controller be tested without a map
/// widget. Degenerate polygons (self-intersecting, zero-area, duplicate
/// points) pass through unmodified; shape sanity beyond point count is the
/// server's concern.
pub fn on_shape_finalized(event: RawShapeEvent) -> ShapeModel {
    match event {
        RawShapeEvent::Circle {
            center,
            radius_meters,
        } => ShapeModel::Circle {
            center,
            radius_meters,
        },
        RawShapeEvent::Polygon { rings } => {
            if rings.len() > 1 {
                warn!(rings = rings.len(), "polygon holes are not supported; using outer ring only");
            }
            ShapeModel::Polygon {
                points: rings.into_iter().next().unwrap_or_default(),
            }
        }
        RawShapeEvent::Rectangle {
            south_west,
            north_east,
        } => ShapeModel::Polygon {
            points: vec![
                south_west,
                GeoPoint {
                    latitude: south_west.latitude,
                    longitude: north_east.longitude,
                },
                north_east,
                GeoPoint {
                    latitude: north_east.latitude,
                    longitude: south_west.longitude,
                },
            ],
        },
    }
}
