use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::Engine;
use crate::{
    api::RequestAPI,
    auth::User,
    config::Settings,
    entities::{Coordinates, Location, NewRequest, NewRide, Request, Ride},
    error::{not_found_error, upstream_error, Error},
    external::{Geocoder, PlaceSuggestion, RoutingResolver},
    store::MemoryStore,
};

/// Fixed route for every origin/destination and a small place table.
pub struct FakeMaps {
    pub route: Vec<Coordinates>,
    pub places: HashMap<String, Coordinates>,
}

impl Default for FakeMaps {
    fn default() -> Self {
        let places = [
            ("place-mg-road", Coordinates { lat: 12.9716, lng: 77.6046 }),
            ("place-whitefield", Coordinates { lat: 12.9698, lng: 77.7500 }),
            ("place-mysore", Coordinates { lat: 12.2958, lng: 76.6394 }),
        ]
        .into_iter()
        .map(|(id, c)| (id.to_string(), c))
        .collect();

        Self {
            route: vec![
                Coordinates { lat: 12.9716, lng: 77.6046 },
                Coordinates { lat: 12.9750, lng: 77.6500 },
                Coordinates { lat: 12.9720, lng: 77.7000 },
                Coordinates { lat: 12.9698, lng: 77.7500 },
            ],
            places,
        }
    }
}

#[async_trait]
impl RoutingResolver for FakeMaps {
    async fn find_route(&self, _: &str, _: &str) -> Result<Vec<Coordinates>, Error> {
        if self.route.is_empty() {
            return Err(upstream_error());
        }

        Ok(self.route.clone())
    }
}

#[async_trait]
impl Geocoder for FakeMaps {
    async fn find_coordinates(&self, place_id: &str) -> Result<Coordinates, Error> {
        self.places
            .get(place_id)
            .copied()
            .ok_or_else(|| not_found_error("place not found"))
    }

    async fn suggest_places(&self, input: &str) -> Result<Vec<PlaceSuggestion>, Error> {
        let mut suggestions: Vec<PlaceSuggestion> = self
            .places
            .keys()
            .filter(|id| id.contains(input))
            .map(|id| PlaceSuggestion {
                place_id: id.clone(),
                description: id.trim_start_matches("place-").replace('-', " "),
            })
            .collect();
        suggestions.sort_by(|a, b| a.place_id.cmp(&b.place_id));

        Ok(suggestions)
    }
}

pub fn engine() -> (Engine, Arc<MemoryStore>) {
    engine_with(FakeMaps::default())
}

pub fn engine_with(maps: FakeMaps) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone(), Arc::new(maps), Settings::default()).unwrap();

    (engine, store)
}

pub fn user(email: &str) -> User {
    User::new(email, "9876543210", email.split('@').next().unwrap_or_default())
}

pub fn new_ride(seats: i32) -> NewRide {
    NewRide {
        origin: "MG Road".into(),
        destination: "Whitefield".into(),
        seats,
        price: 150,
        place_id: "place-mg-road".into(),
        timestamp: 1_700_000_000,
    }
}

pub fn pickup() -> Location {
    Location::new(Coordinates { lat: 12.9750, lng: 77.6500 }, "Domlur".into())
}

pub fn join(engine: &Engine, rider: &User, ride: &Ride) -> Result<Request, Error> {
    tokio_test::block_on(engine.create_request(
        rider.clone(),
        NewRequest {
            ride_id: ride.id,
            pickup: pickup(),
        },
    ))
}
