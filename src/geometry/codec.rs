use crate::error::AppError;
use crate::models::geofence::{GeoPoint, Geometry};

const MIN_POLYGON_POINTS: usize = 3;

/// Fallback radius in meters when the server hands back a non-positive or
/// non-finite value. The server is not supposed to, but we clamp instead of
/// crashing the map layer.
const RADIUS_FLOOR_METERS: f64 = 1.0;

/// In-memory editing model used by the map layer. This is the only shape
/// representation the rest of the client handles; all unit handling and
/// wire conversion happens in this module.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeModel {
    Circle { center: GeoPoint, radius_meters: f64 },
    Polygon { points: Vec<GeoPoint> },
}

/// Convert an editing model into the wire geometry, validating it.
///
/// Fails if the radius is not a positive finite number, if a polygon has
/// fewer than three points, or if any coordinate is outside the valid
/// latitude/longitude range.
pub fn to_wire_geometry(model: &ShapeModel) -> Result<Geometry, AppError> {
    match model {
        ShapeModel::Circle {
            center,
            radius_meters,
        } => {
            validate_point(center)?;
            if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                return Err(AppError::InvalidGeometry(format!(
                    "circle radius must be a positive number of meters, got {radius_meters}"
                )));
            }
            Ok(Geometry::Circle {
                center: *center,
                radius: *radius_meters,
            })
        }
        ShapeModel::Polygon { points } => {
            if points.len() < MIN_POLYGON_POINTS {
                return Err(AppError::InvalidGeometry(format!(
                    "polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
                    points.len()
                )));
            }
            for point in points {
                validate_point(point)?;
            }
            Ok(Geometry::Polygon {
                points: points.clone(),
            })
        }
    }
}

/// Convert wire geometry back into the editing model.
///
/// Never fails: out-of-range coordinates are clamped and a malformed radius
/// is floored rather than rejected, since the server is the source of truth
/// and a crash here would take the whole map view down.
pub fn from_wire_geometry(geometry: &Geometry) -> ShapeModel {
    match geometry {
        Geometry::Circle { center, radius } => {
            let radius_meters = if radius.is_finite() && *radius > 0.0 {
                *radius
            } else {
                RADIUS_FLOOR_METERS
            };
            ShapeModel::Circle {
                center: clamp_point(center),
                radius_meters,
            }
        }
        Geometry::Polygon { points } => ShapeModel::Polygon {
            points: points.iter().map(clamp_point).collect(),
        },
    }
}

fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(AppError::InvalidGeometry(format!(
            "latitude {} out of range [-90, 90]",
            point.latitude
        )));
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(AppError::InvalidGeometry(format!(
            "longitude {} out of range [-180, 180]",
            point.longitude
        )));
    }
    Ok(())
}

fn clamp_point(point: &GeoPoint) -> GeoPoint {
    let latitude = if point.latitude.is_nan() {
        0.0
    } else {
        point.latitude.clamp(-90.0, 90.0)
    };
    let longitude = if point.longitude.is_nan() {
        0.0
    } else {
        point.longitude.clamp(-180.0, 180.0)
    };
    GeoPoint {
        latitude,
        longitude,
    }
}

#[cfg(test)]
mod tests {
    use super::{ShapeModel, from_wire_geometry, to_wire_geometry};
    use crate::error::AppError;
    use crate::models::geofence::{GeoPoint, Geometry};

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn valid_circle_round_trips() {
        let model = ShapeModel::Circle {
            center: point(-25.75, 28.23),
            radius_meters: 500.0,
        };

        let wire = to_wire_geometry(&model).unwrap();
        assert_eq!(from_wire_geometry(&wire), model);
    }

    #[test]
    fn polygon_round_trip_preserves_point_order_and_count() {
        let points = vec![
            point(0.0, 0.0),
            point(0.0, 1.0),
            point(1.0, 1.0),
            point(1.0, 0.0),
        ];
        let model = ShapeModel::Polygon {
            points: points.clone(),
        };

        let wire = to_wire_geometry(&model).unwrap();
        match from_wire_geometry(&wire) {
            ShapeModel::Polygon {
                points: round_tripped,
            } => assert_eq!(round_tripped, points),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn zero_or_negative_radius_is_rejected() {
        for radius_meters in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let model = ShapeModel::Circle {
                center: point(0.0, 0.0),
                radius_meters,
            };
            assert!(matches!(
                to_wire_geometry(&model),
                Err(AppError::InvalidGeometry(_))
            ));
        }
    }

    #[test]
    fn two_point_polygon_is_rejected() {
        let model = ShapeModel::Polygon {
            points: vec![point(0.0, 0.0), point(1.0, 1.0)],
        };
        assert!(matches!(
            to_wire_geometry(&model),
            Err(AppError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let model = ShapeModel::Circle {
            center: point(91.0, 0.0),
            radius_meters: 100.0,
        };
        assert!(matches!(
            to_wire_geometry(&model),
            Err(AppError::InvalidGeometry(_))
        ));

        let model = ShapeModel::Circle {
            center: point(0.0, -180.5),
            radius_meters: 100.0,
        };
        assert!(matches!(
            to_wire_geometry(&model),
            Err(AppError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn malformed_wire_geometry_is_clamped_not_rejected() {
        let wire = Geometry::Circle {
            center: point(95.0, -200.0),
            radius: -5.0,
        };

        match from_wire_geometry(&wire) {
            ShapeModel::Circle {
                center,
                radius_meters,
            } => {
                assert_eq!(center, point(90.0, -180.0));
                assert!(radius_meters > 0.0);
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }
}
