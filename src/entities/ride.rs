use geo_types::{Geometry, MultiPoint, Point};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Coordinates, Location, Member, Passenger};
use crate::error::{
    conflict_error, invalid_input_error, invalid_invocation_error, upstream_error, Error,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver: Member,
    pub origin: String,
    pub destination: String,
    pub place_id: String,
    pub origin_coordinates: Coordinates,
    pub seats: i32,
    pub passengers: Vec<Passenger>,
    pub price: i64,
    pub timestamp: i64,
    pub complete: bool,
    /// Origin, midpoint and destination of the resolved route.
    pub geo: Vec<Coordinates>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRide {
    pub origin: String,
    pub destination: String,
    pub seats: i32,
    pub price: i64,
    pub place_id: String,
    pub timestamp: i64,
}

impl NewRide {
    pub fn validate(&self) -> Result<(), Error> {
        if self.origin.trim().is_empty() || self.destination.trim().is_empty() {
            return Err(invalid_input_error(
                "origin and destination are required",
            ));
        }

        if self.place_id.trim().is_empty() {
            return Err(invalid_input_error("place_id is required"));
        }

        if self.seats < 1 {
            return Err(invalid_input_error("seats must be positive"));
        }

        if self.price < 0 {
            return Err(invalid_input_error("price must not be negative"));
        }

        Ok(())
    }
}

/// The ride fields a driver may change after creation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RidePatch {
    pub price: Option<i64>,
    pub timestamp: Option<i64>,
}

impl RidePatch {
    pub fn validate(&self) -> Result<(), Error> {
        if self.price.is_none() && self.timestamp.is_none() {
            return Err(invalid_input_error("nothing to update"));
        }

        if matches!(self.price, Some(price) if price < 0) {
            return Err(invalid_input_error("price must not be negative"));
        }

        Ok(())
    }
}

impl Ride {
    pub fn new(driver: Member, params: NewRide, route: Vec<Coordinates>) -> Result<Self, Error> {
        let origin_point = *route.first().ok_or_else(upstream_error)?;
        let middle_point = route[route.len() / 2];
        let destination_point = route[route.len() - 1];

        let pickup = Location::new(origin_point, params.origin.clone());

        Ok(Self {
            id: Uuid::new_v4(),
            passengers: vec![Passenger::driver(driver.clone(), pickup)],
            driver,
            origin: params.origin,
            destination: params.destination,
            place_id: params.place_id,
            origin_coordinates: origin_point,
            seats: params.seats,
            price: params.price,
            timestamp: params.timestamp,
            complete: false,
            geo: vec![origin_point, middle_point, destination_point],
        })
    }

    pub fn has_spare_seat(&self) -> bool {
        (self.seats as usize) > self.passengers.len()
    }

    pub fn is_joinable(&self) -> bool {
        !self.complete && self.has_spare_seat()
    }

    pub fn has_member(&self, email: &str) -> bool {
        self.passengers.iter().any(|p| p.member.email == email)
    }

    pub fn riders(&self) -> impl Iterator<Item = &Passenger> {
        self.passengers.iter().filter(|p| !p.is_driver())
    }

    #[tracing::instrument(skip(self, passenger), fields(ride_id = %self.id))]
    pub fn push_passenger(&mut self, passenger: Passenger) -> Result<(), Error> {
        if self.complete {
            return Err(invalid_invocation_error());
        }

        if !self.has_spare_seat() {
            return Err(conflict_error("no seats available"));
        }

        if self.has_member(&passenger.member.email) {
            return Err(conflict_error("rider is already aboard"));
        }

        self.passengers.push(passenger);
        Ok(())
    }

    pub fn apply(&mut self, patch: &RidePatch) {
        if let Some(price) = patch.price {
            self.price = price;
        }

        if let Some(timestamp) = patch.timestamp {
            self.timestamp = timestamp;
        }
    }

    pub fn complete(&mut self) -> Result<(), Error> {
        if self.complete {
            return Err(invalid_invocation_error());
        }

        self.complete = true;
        Ok(())
    }

    pub fn geometry(&self) -> Geometry<f64> {
        let points: Vec<Point<f64>> = self.geo.iter().map(|&c| c.into()).collect();
        Geometry::MultiPoint(MultiPoint(points))
    }

    /// Distance from `coordinates` to the nearest point of the ride geometry.
    pub fn distance_to(&self, coordinates: &Coordinates) -> f64 {
        self.geo
            .iter()
            .map(|point| point.distance_to(coordinates))
            .fold(f64::INFINITY, f64::min)
    }
}

impl PolarClass for Ride {
    fn get_polar_class_builder() -> oso::ClassBuilder<Ride> {
        oso::Class::builder()
            .name("Ride")
            .add_attribute_getter("driver_email", |recv: &Ride| recv.driver.email.clone())
            .add_attribute_getter("complete", |recv: &Ride| recv.complete)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Ride::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
pub(crate) fn test_member(email: &str) -> Member {
    Member {
        email: email.into(),
        phone: "9876543210".into(),
        name: email.split('@').next().unwrap_or_default().into(),
    }
}

#[cfg(test)]
pub(crate) fn test_ride(driver: &str, seats: i32) -> Ride {
    let params = NewRide {
        origin: "MG Road".into(),
        destination: "Whitefield".into(),
        seats,
        price: 120,
        place_id: "place-mg-road".into(),
        timestamp: 1_700_000_000,
    };

    let route = vec![
        Coordinates { lat: 12.97, lng: 77.60 },
        Coordinates { lat: 12.97, lng: 77.65 },
        Coordinates { lat: 12.97, lng: 77.70 },
        Coordinates { lat: 12.96, lng: 77.75 },
    ];

    Ride::new(test_member(driver), params, route).unwrap()
}

#[test]
fn new_ride_seats_driver_and_derives_geometry() {
    let ride = test_ride("driver@example.com", 3);

    assert_eq!(ride.passengers.len(), 1);
    assert!(ride.passengers[0].is_driver());
    assert_eq!(ride.passengers[0].member.email, "driver@example.com");
    assert_eq!(ride.passengers[0].pickup.description, "MG Road");

    assert_eq!(ride.geo.len(), 3);
    assert_eq!(ride.geo[0], Coordinates { lat: 12.97, lng: 77.60 });
    assert_eq!(ride.geo[1], Coordinates { lat: 12.97, lng: 77.70 });
    assert_eq!(ride.geo[2], Coordinates { lat: 12.96, lng: 77.75 });
    assert_eq!(ride.origin_coordinates, ride.geo[0]);
    assert!(!ride.complete);
}

#[test]
fn new_ride_requires_route_points() {
    let params = NewRide {
        origin: "a".into(),
        destination: "b".into(),
        seats: 2,
        price: 0,
        place_id: "p".into(),
        timestamp: 0,
    };

    let err = Ride::new(test_member("d@example.com"), params, vec![]).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Unavailable);
}

#[test]
fn single_point_route_is_accepted() {
    let params = NewRide {
        origin: "a".into(),
        destination: "a".into(),
        seats: 2,
        price: 0,
        place_id: "p".into(),
        timestamp: 0,
    };
    let point = Coordinates { lat: 1.0, lng: 1.0 };

    let ride = Ride::new(test_member("d@example.com"), params, vec![point]).unwrap();
    assert_eq!(ride.geo, vec![point, point, point]);
}

#[test]
fn new_ride_validation() {
    let mut params = NewRide {
        origin: "a".into(),
        destination: "b".into(),
        seats: 0,
        price: 10,
        place_id: "p".into(),
        timestamp: 0,
    };
    assert!(params.validate().is_err());

    params.seats = 2;
    assert!(params.validate().is_ok());

    params.destination = "".into();
    assert!(params.validate().is_err());
}

#[test]
fn push_passenger_respects_capacity() {
    let mut ride = test_ride("driver@example.com", 2);
    let pickup = ride.passengers[0].pickup.clone();

    ride.push_passenger(Passenger::rider(
        Uuid::new_v4(),
        test_member("a@example.com"),
        pickup.clone(),
    ))
    .unwrap();
    assert!(!ride.has_spare_seat());

    let err = ride
        .push_passenger(Passenger::rider(
            Uuid::new_v4(),
            test_member("b@example.com"),
            pickup,
        ))
        .unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(ride.passengers.len(), 2);
    assert_eq!(ride.riders().count(), 1);
}

#[test]
fn push_passenger_rejects_duplicate_rider() {
    let mut ride = test_ride("driver@example.com", 4);
    let pickup = ride.passengers[0].pickup.clone();
    let rider = test_member("a@example.com");

    ride.push_passenger(Passenger::rider(Uuid::new_v4(), rider.clone(), pickup.clone()))
        .unwrap();
    assert!(ride
        .push_passenger(Passenger::rider(Uuid::new_v4(), rider, pickup))
        .is_err());
}

#[test]
fn patch_only_touches_allowed_fields() {
    let mut ride = test_ride("driver@example.com", 3);
    let seats = ride.seats;

    let patch = RidePatch {
        price: Some(300),
        timestamp: None,
    };
    patch.validate().unwrap();
    ride.apply(&patch);

    assert_eq!(ride.price, 300);
    assert_eq!(ride.timestamp, 1_700_000_000);
    assert_eq!(ride.seats, seats);

    assert!(RidePatch::default().validate().is_err());
    assert!(serde_json::from_str::<RidePatch>(r#"{"seats": 9}"#).is_err());
}

#[test]
fn complete_is_one_shot() {
    let mut ride = test_ride("driver@example.com", 3);
    ride.complete().unwrap();
    assert!(!ride.is_joinable());
    assert!(ride.complete().is_err());
}
