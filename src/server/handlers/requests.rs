use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::{Location, NewRequest, Request};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct AcceptParams {
    pickup: Option<Location>,
}

#[derive(Serialize, Deserialize)]
pub struct WindowParams {
    window: Option<i64>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewRequest>,
) -> Result<Json<Request>, Error> {
    let request = api.create_request(user, params).await?;

    Ok(request.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    params: Option<Json<AcceptParams>>,
) -> Result<(), Error> {
    let pickup = params.and_then(|Json(params)| params.pickup);

    api.accept_request(user, id, pickup).await
}

pub async fn reject(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    api.reject_request(user, id).await
}

pub async fn delete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    api.delete_request(user, id).await
}

pub async fn list_for_ride(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Vec<Request>>, Error> {
    let requests = api.list_ride_requests(user, ride_id).await?;

    Ok(requests.into())
}

pub async fn list_for_rider(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<Request>>, Error> {
    let requests = api.list_rider_requests(user, params.window).await?;

    Ok(requests.into())
}
