use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Location, NewRequest, NewRide, Request, Ride, RidePatch};
use crate::error::Error;
use crate::external::PlaceSuggestion;

/// Which side of a ride the caller is asking about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Rider,
}

#[async_trait]
pub trait RideAPI {
    async fn create_ride(&self, user: User, params: NewRide) -> Result<Ride, Error>;
    async fn update_ride(&self, user: User, patch: RidePatch) -> Result<Ride, Error>;
    async fn complete_ride(&self, user: User) -> Result<(), Error>;
    async fn delete_ride(&self, user: User) -> Result<Ride, Error>;
    async fn find_active_ride(&self, user: User, role: Role) -> Result<Ride, Error>;
    async fn list_rides(&self, user: User, role: Role) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait RequestAPI {
    async fn create_request(&self, user: User, params: NewRequest) -> Result<Request, Error>;
    async fn accept_request(
        &self,
        user: User,
        id: Uuid,
        pickup: Option<Location>,
    ) -> Result<(), Error>;
    async fn reject_request(&self, user: User, id: Uuid) -> Result<(), Error>;
    async fn delete_request(&self, user: User, id: Uuid) -> Result<(), Error>;
    async fn list_ride_requests(&self, user: User, ride_id: Uuid) -> Result<Vec<Request>, Error>;
    async fn list_rider_requests(
        &self,
        user: User,
        window: Option<i64>,
    ) -> Result<Vec<Request>, Error>;
}

#[async_trait]
pub trait SearchAPI {
    async fn find_nearby_rides(
        &self,
        user: User,
        place_id: String,
        radius: Option<f64>,
    ) -> Result<Vec<Ride>, Error>;
    async fn suggest_places(&self, user: User, input: String)
        -> Result<Vec<PlaceSuggestion>, Error>;
}

pub trait API: RideAPI + RequestAPI + SearchAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
