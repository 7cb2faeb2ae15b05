use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};

use crate::api::{DynAPI, Role};
use crate::auth::User;
use crate::entities::{NewRide, Ride, RidePatch};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct RoleParams {
    #[serde(rename = "as")]
    role: Role,
}

#[derive(Serialize, Deserialize)]
pub struct SearchParams {
    radius: Option<f64>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewRide>,
) -> Result<Json<Ride>, Error> {
    let ride = api.create_ride(user, params).await?;

    Ok(ride.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<RoleParams>,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.list_rides(user, params.role).await?;

    Ok(rides.into())
}

pub async fn find_active(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<RoleParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_active_ride(user, params.role).await?;

    Ok(ride.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(patch): Json<RidePatch>,
) -> Result<Json<Ride>, Error> {
    let ride = api.update_ride(user, patch).await?;

    Ok(ride.into())
}

pub async fn complete(Extension(api): Extension<DynAPI>, user: User) -> Result<(), Error> {
    api.complete_ride(user).await
}

pub async fn delete(Extension(api): Extension<DynAPI>, user: User) -> Result<Json<Ride>, Error> {
    let ride = api.delete_ride(user).await?;

    Ok(ride.into())
}

pub async fn search(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(place_id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.find_nearby_rides(user, place_id, params.radius).await?;

    Ok(rides.into())
}
