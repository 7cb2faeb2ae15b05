mod request_api;
mod ride_api;
mod search_api;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use oso::Oso;

use crate::{
    api::API,
    auth::authorizor,
    config::Settings,
    error::{unauthorized_error, Error},
    external::{Geocoder, RoutingResolver},
    store::{NotificationSink, RequestStore, RideStore},
};

pub struct Engine {
    rides: Arc<dyn RideStore>,
    requests: Arc<dyn RequestStore>,
    notifications: Arc<dyn NotificationSink>,
    routing: Arc<dyn RoutingResolver>,
    geocoder: Arc<dyn Geocoder>,
    settings: Settings,
    authorizor: Oso,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new<S, M>(store: Arc<S>, maps: Arc<M>, settings: Settings) -> Result<Self, Error>
    where
        S: RideStore + RequestStore + NotificationSink + 'static,
        M: RoutingResolver + Geocoder + 'static,
    {
        Ok(Self {
            rides: store.clone(),
            requests: store.clone(),
            notifications: store,
            routing: maps.clone(),
            geocoder: maps,
            settings,
            authorizor: authorizor::new()?,
        })
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }
}

impl Engine {
    /// True when the user already waits on a ride or sits in one, driving included.
    async fn is_rider_engaged(&self, email: &str) -> Result<bool, Error> {
        if self.rides.find_active_ride_by_member(email).await?.is_some() {
            return Ok(true);
        }

        Ok(self.requests.find_open_request_by_rider(email).await?.is_some())
    }
}

impl API for Engine {}
