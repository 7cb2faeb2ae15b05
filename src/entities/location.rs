use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_input_error, Error};

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.lat.is_finite() || self.lat < -90.0 || self.lat > 90.0 {
            return Err(invalid_input_error("latitude out of range"));
        }

        if !self.lng.is_finite() || self.lng < -180.0 || self.lng > 180.0 {
            return Err(invalid_input_error("longitude out of range"));
        }

        Ok(())
    }

    /// Great-circle (haversine) distance in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.lng, coordinates.lat)
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Geometry::Point(coordinates.into())
    }
}

/// A described point, used for ride origins and rider pickups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub description: String,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(coordinates: Coordinates, description: String) -> Self {
        Self {
            description,
            coordinates,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.description.trim().is_empty() {
            return Err(invalid_input_error("pickup description is required"));
        }

        self.coordinates.validate()
    }
}

#[test]
fn coordinates_range_checks() {
    assert!(Coordinates { lat: 12.9, lng: 77.6 }.validate().is_ok());
    assert!(Coordinates { lat: 91.0, lng: 0.0 }.validate().is_err());
    assert!(Coordinates { lat: 0.0, lng: -180.5 }.validate().is_err());
    assert!(Coordinates {
        lat: f64::NAN,
        lng: 0.0
    }
    .validate()
    .is_err());
}

#[test]
fn distance_between_known_points() {
    let a = Coordinates { lat: 12.9716, lng: 77.5946 };
    let b = Coordinates { lat: 12.9352, lng: 77.6245 };

    let distance = a.distance_to(&b);
    assert!(distance > 5100.0 && distance < 5300.0, "{}", distance);
    assert_eq!(a.distance_to(&a), 0.0);
}

#[test]
fn point_uses_lng_lat_order() {
    let point: Point<f64> = Coordinates { lat: 1.0, lng: 2.0 }.into();
    assert_eq!(point.x(), 2.0);
    assert_eq!(point.y(), 1.0);
}

#[test]
fn location_requires_description() {
    let location = Location::new(Coordinates { lat: 0.0, lng: 0.0 }, " ".into());
    assert!(location.validate().is_err());
}
