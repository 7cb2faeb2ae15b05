use std::collections::HashSet;

use async_trait::async_trait;

use super::Engine;
use crate::{
    api::{RideAPI, Role},
    auth::User,
    entities::{NewRide, Notification, Ride, RidePatch},
    error::{conflict_error, not_found_error, Error},
};

fn ride_not_found() -> Error {
    not_found_error("ride not found")
}

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_ride(&self, user: User, params: NewRide) -> Result<Ride, Error> {
        params.validate()?;

        if self.rides.find_active_ride_by_driver(&user.email).await?.is_some() {
            tracing::info!("driver already has an active ride");
            return Err(conflict_error("ride already exists"));
        }

        if self.is_rider_engaged(&user.email).await? {
            tracing::info!("driver already waits on or sits in another ride");
            return Err(conflict_error("driver already has an open request or ride"));
        }

        let route = self
            .routing
            .find_route(&params.origin, &params.destination)
            .await?;

        let ride = Ride::new(user.member(), params, route)?;

        // a concurrent create for the same driver loses on the unique index
        self.rides.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, "ride created");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn update_ride(&self, user: User, patch: RidePatch) -> Result<Ride, Error> {
        patch.validate()?;

        self.rides
            .update_active_ride(&user.email, &patch)
            .await?
            .ok_or_else(ride_not_found)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(&self, user: User) -> Result<(), Error> {
        let ride = self
            .rides
            .complete_active_ride(&user.email)
            .await?
            .ok_or_else(ride_not_found)?;

        let rejected = self.requests.reject_pending_requests_for_ride(ride.id).await?;

        tracing::info!(ride_id = %ride.id, rejected = rejected.len(), "ride completed");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_ride(&self, user: User) -> Result<Ride, Error> {
        let ride = self
            .rides
            .delete_active_ride(&user.email)
            .await?
            .ok_or_else(ride_not_found)?;

        let requests = self.requests.delete_requests_for_ride(ride.id).await?;

        let mut notified = HashSet::new();

        let riders = ride
            .riders()
            .map(|p| p.member.email.clone())
            .chain(
                requests
                    .into_iter()
                    .filter(|r| r.is_pending())
                    .map(|r| r.rider.email),
            );

        for email in riders {
            if notified.insert(email.clone()) {
                self.notifications
                    .enqueue(&Notification::ride_cancelled(&email, &ride))
                    .await?;
            }
        }

        tracing::info!(ride_id = %ride.id, notified = notified.len(), "ride deleted");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_ride(&self, user: User, role: Role) -> Result<Ride, Error> {
        let ride = match role {
            Role::Driver => self.rides.find_active_ride_by_driver(&user.email).await?,
            Role::Rider => self.rides.find_active_ride_by_member(&user.email).await?,
        };

        ride.ok_or_else(ride_not_found)
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides(&self, user: User, role: Role) -> Result<Vec<Ride>, Error> {
        match role {
            Role::Driver => self.rides.list_rides_by_driver(&user.email).await,
            Role::Rider => self.rides.list_rides_by_member(&user.email).await,
        }
    }
}

#[test]
fn create_ride_seats_driver() {
    use crate::engine::testing::{engine, new_ride, user};
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();

    assert_eq!(ride.driver, driver.member());
    assert_eq!(ride.passengers.len(), 1);
    assert!(ride.passengers[0].is_driver());
    assert_eq!(ride.geo.len(), 3);
    assert!(!ride.complete);
}

#[test]
fn second_active_ride_conflicts_until_completed() {
    use crate::engine::testing::{engine, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");

    block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();

    let err = block_on(engine.create_ride(driver.clone(), new_ride(2))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "ride already exists");

    block_on(engine.complete_ride(driver.clone())).unwrap();
    block_on(engine.create_ride(driver.clone(), new_ride(2))).unwrap();

    block_on(engine.delete_ride(driver.clone())).unwrap();
    block_on(engine.create_ride(driver, new_ride(2))).unwrap();
}

#[test]
fn rider_with_pending_request_cannot_drive() {
    use crate::api::RequestAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::RideStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    let err = block_on(engine.create_ride(rider.clone(), new_ride(3))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(block_on(store.find_active_ride_by_driver(&rider.email))
        .unwrap()
        .is_none());

    // the waiting request is still acceptable
    block_on(engine.accept_request(driver, request.id, None)).unwrap();

    let active = block_on(engine.find_active_ride(rider, Role::Rider)).unwrap();
    assert_eq!(active.id, ride.id);
}

#[test]
fn seated_rider_cannot_drive() {
    use crate::api::RequestAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();
    block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();

    let err = block_on(engine.create_ride(rider.clone(), new_ride(3))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "driver already has an open request or ride");

    // free again once the shared ride is over
    block_on(engine.complete_ride(driver)).unwrap();
    block_on(engine.create_ride(rider, new_ride(3))).unwrap();
}

#[test]
fn invalid_ride_is_rejected_before_routing() {
    use crate::engine::testing::{engine_with, new_ride, user, FakeMaps};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine_with(FakeMaps {
        route: vec![],
        ..FakeMaps::default()
    });

    let err = block_on(engine.create_ride(user("driver@example.com"), new_ride(0))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);

    let err = block_on(engine.create_ride(user("driver@example.com"), new_ride(2))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
}

#[test]
fn update_ride_merges_allowed_fields() {
    use crate::engine::testing::{engine, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");

    let err = block_on(engine.update_ride(
        driver.clone(),
        RidePatch {
            price: Some(90),
            timestamp: None,
        },
    ))
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();

    let updated = block_on(engine.update_ride(
        driver.clone(),
        RidePatch {
            price: Some(90),
            timestamp: None,
        },
    ))
    .unwrap();

    assert_eq!(updated.id, ride.id);
    assert_eq!(updated.price, 90);
    assert_eq!(updated.timestamp, ride.timestamp);

    let err = block_on(engine.update_ride(driver, RidePatch::default())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);
}

#[test]
fn complete_ride_twice_is_not_found() {
    use crate::engine::testing::{engine, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");

    block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    block_on(engine.complete_ride(driver.clone())).unwrap();

    let err = block_on(engine.complete_ride(driver)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn complete_ride_rejects_pending_requests() {
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::entities::RequestStatus;
    use crate::error::ErrorKind;
    use crate::store::RequestStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    block_on(engine.complete_ride(driver)).unwrap();

    let request = block_on(store.find_request(request.id)).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Rejected);

    let err = block_on(engine.find_active_ride(rider, Role::Rider)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn delete_ride_notifies_riders_once() {
    use crate::api::RequestAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::entities::NotificationKind;
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let accepted = user("accepted@example.com");
    let waiting = user("waiting@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(4))).unwrap();

    let request = join(&engine, &accepted, &ride).unwrap();
    block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();

    let pending = join(&engine, &waiting, &ride).unwrap();

    let deleted = block_on(engine.delete_ride(driver.clone())).unwrap();
    assert_eq!(deleted.id, ride.id);

    assert!(block_on(store.find_ride(ride.id)).unwrap().is_none());
    assert!(block_on(store.find_request(request.id)).unwrap().is_none());
    assert!(block_on(store.find_request(pending.id)).unwrap().is_none());

    let mut cancelled: Vec<String> = block_on(store.notifications())
        .into_iter()
        .filter(|n| n.kind == NotificationKind::RideCancelled)
        .map(|n| n.email)
        .collect();
    cancelled.sort();

    assert_eq!(cancelled, vec![accepted.email, waiting.email]);

    let err = block_on(engine.delete_ride(driver)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn active_ride_and_listing_by_role() {
    use crate::api::RequestAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    assert!(block_on(engine.list_rides(driver.clone(), Role::Driver))
        .unwrap()
        .is_empty());

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();

    let active = block_on(engine.find_active_ride(driver.clone(), Role::Driver)).unwrap();
    assert_eq!(active.id, ride.id);

    let err = block_on(engine.find_active_ride(rider.clone(), Role::Rider)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let request = join(&engine, &rider, &ride).unwrap();
    block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();

    let active = block_on(engine.find_active_ride(rider.clone(), Role::Rider)).unwrap();
    assert_eq!(active.id, ride.id);

    block_on(engine.complete_ride(driver.clone())).unwrap();

    let mut next = new_ride(2);
    next.timestamp += 3600;
    let second = block_on(engine.create_ride(driver.clone(), next)).unwrap();

    let ids: Vec<_> = block_on(engine.list_rides(driver, Role::Driver))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![second.id, ride.id]);

    let ids: Vec<_> = block_on(engine.list_rides(rider, Role::Rider))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![ride.id]);
}
