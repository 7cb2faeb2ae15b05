mod handlers;

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequest, RequestParts},
    routing::{delete, get, patch, post},
    Router,
};

use crate::server::handlers::{places, requests, rides};
use crate::{
    api::DynAPI,
    auth::{DynIdentityGate, User},
    error::{unexpected_error, Error},
};

/// Resolves the caller through the identity gate installed on the router.
#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(gate) = Extension::<DynIdentityGate>::from_request(req)
            .await
            .map_err(|_| unexpected_error())?;

        gate.verify(req.headers()).await
    }
}

pub fn router(api: DynAPI, gate: DynIdentityGate) -> Router {
    Router::new()
        .route("/", get(handlers::alive))
        .route("/rides", post(rides::create).get(rides::list))
        .route(
            "/rides/active",
            get(rides::find_active)
                .patch(rides::update)
                .delete(rides::delete),
        )
        .route("/rides/active/complete", patch(rides::complete))
        .route("/rides/search/:place_id", get(rides::search))
        .route("/places/suggestions", get(places::suggestions))
        .route("/rides/:id/requests", get(requests::list_for_ride))
        .route("/requests", post(requests::create).get(requests::list_for_rider))
        .route("/requests/:id", delete(requests::delete))
        .route("/requests/:id/accept", patch(requests::accept))
        .route("/requests/:id/reject", patch(requests::reject))
        .layer(Extension(api))
        .layer(Extension(gate))
}

pub async fn serve(api: DynAPI, gate: DynIdentityGate, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api, gate);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!("server error: {}", err);
            unexpected_error()
        })
}
