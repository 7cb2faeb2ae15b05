use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::Engine;
use crate::{
    api::RequestAPI,
    auth::User,
    entities::{Location, NewRequest, Notification, Request, RequestStatus},
    error::{conflict_error, invalid_input_error, not_found_error, Error},
};

fn request_not_found() -> Error {
    not_found_error("request not found")
}

fn ride_not_found() -> Error {
    not_found_error("ride not found")
}

impl Engine {
    /// Explains why the conditional passenger push matched nothing.
    async fn push_failure(&self, ride_id: Uuid, driver_email: &str, rider_email: &str) -> Error {
        match self.rides.find_ride(ride_id).await {
            Ok(Some(ride)) if ride.driver.email == driver_email && !ride.complete => {
                if ride.has_member(rider_email) {
                    conflict_error("rider is already aboard")
                } else {
                    conflict_error("no seats available")
                }
            }
            Ok(_) => ride_not_found(),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl RequestAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_request(&self, user: User, params: NewRequest) -> Result<Request, Error> {
        params.pickup.validate()?;

        let (engaged, ride) = futures::join!(
            self.is_rider_engaged(&user.email),
            self.rides.find_joinable_ride(params.ride_id)
        );

        if engaged? {
            tracing::info!("rider already has an open request or an active ride");
            return Err(conflict_error("rider already has an open request or ride"));
        }

        let ride = ride?.ok_or_else(ride_not_found)?;

        let request = Request::new(user.member(), params);

        // a concurrent create for the same rider loses on the unique index
        self.requests.insert_request(&request).await?;

        self.notifications
            .enqueue(&Notification::request_created(&ride, &request.rider))
            .await?;

        tracing::info!(request_id = %request.id, ride_id = %ride.id, "request created");

        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_request(
        &self,
        user: User,
        id: Uuid,
        pickup: Option<Location>,
    ) -> Result<(), Error> {
        if let Some(pickup) = &pickup {
            pickup.validate()?;
        }

        let request = self
            .requests
            .find_request(id)
            .await?
            .ok_or_else(request_not_found)?;

        if !request.is_pending() {
            return Err(conflict_error("request is not pending"));
        }

        let passenger = request.passenger(pickup);

        let pushed = self
            .rides
            .push_passenger(request.ride_id, &user.email, &passenger)
            .await?;

        if pushed.is_none() {
            tracing::info!("passenger push matched no ride");
            return Err(self
                .push_failure(request.ride_id, &user.email, &request.rider.email)
                .await);
        }

        self.requests
            .resolve_request(id, RequestStatus::Accepted)
            .await?
            .ok_or_else(|| conflict_error("request is not pending"))?;

        let removed = self
            .requests
            .delete_other_pending_requests(&request.rider.email, id)
            .await?;

        self.notifications
            .enqueue(&Notification::request_accepted(
                &request.rider.email,
                &user.member(),
            ))
            .await?;

        tracing::info!(request_id = %id, removed, "request accepted");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn reject_request(&self, user: User, id: Uuid) -> Result<(), Error> {
        let request = self
            .requests
            .find_request(id)
            .await?
            .ok_or_else(request_not_found)?;

        let ride = self
            .rides
            .find_ride(request.ride_id)
            .await?
            .ok_or_else(ride_not_found)?;

        self.authorize(user.clone(), "manage_requests", ride)?;

        self.requests
            .resolve_request(id, RequestStatus::Rejected)
            .await?
            .ok_or_else(|| conflict_error("request is not pending"))?;

        self.notifications
            .enqueue(&Notification::request_rejected(
                &request.rider.email,
                &user.member(),
            ))
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_request(&self, user: User, id: Uuid) -> Result<(), Error> {
        self.requests
            .delete_pending_request(id, &user.email)
            .await?
            .ok_or_else(request_not_found)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_ride_requests(&self, user: User, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let ride = self
            .rides
            .find_ride(ride_id)
            .await?
            .ok_or_else(ride_not_found)?;

        self.authorize(user, "manage_requests", ride)?;

        self.requests.list_requests_for_ride(ride_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_rider_requests(
        &self,
        user: User,
        window: Option<i64>,
    ) -> Result<Vec<Request>, Error> {
        let window = window.unwrap_or(self.settings.request_window);

        if window < 0 {
            return Err(invalid_input_error("window must not be negative"));
        }

        let since = Utc::now().timestamp() - window;

        self.requests.list_requests_by_rider(&user.email, since).await
    }
}


#[test]
fn create_request_notifies_driver() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::entities::NotificationKind;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.ride_id, ride.id);
    assert_eq!(request.rider, rider.member());

    let notifications = block_on(store.notifications());
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::RequestCreated);
    assert_eq!(notifications[0].email, driver.email);
    assert_eq!(notifications[0].sender_name, rider.name);
}

#[test]
fn create_request_checks() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, pickup, user};
    use crate::entities::Coordinates;
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();

    let err = block_on(engine.create_request(
        rider.clone(),
        NewRequest {
            ride_id: Uuid::new_v4(),
            pickup: pickup(),
        },
    ))
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = block_on(engine.create_request(
        rider.clone(),
        NewRequest {
            ride_id: ride.id,
            pickup: Location::new(Coordinates { lat: 95.0, lng: 0.0 }, "nowhere".into()),
        },
    ))
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);

    join(&engine, &rider, &ride).unwrap();

    let err = join(&engine, &rider, &ride).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[test]
fn member_of_active_ride_cannot_request() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");
    let other = user("other@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let second = block_on(engine.create_ride(other, new_ride(3))).unwrap();

    let request = join(&engine, &rider, &ride).unwrap();
    block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();

    let err = join(&engine, &rider, &second).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let err = join(&engine, &driver, &second).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_by_one_rider_keep_one() {
    use std::sync::Arc;

    use crate::api::RideAPI;
    use crate::engine::testing::{engine, new_ride, pickup, user};
    use crate::entities::NotificationKind;
    use crate::store::RequestStore;

    let (engine, store) = engine();
    let engine = Arc::new(engine);
    let rider = user("rider@example.com");

    let mut rides = vec![];
    for i in 0..8 {
        let driver = user(&format!("driver{}@example.com", i));
        rides.push(engine.create_ride(driver, new_ride(3)).await.unwrap());
    }

    let handles: Vec<_> = rides
        .iter()
        .map(|ride| {
            let engine = engine.clone();
            let rider = rider.clone();
            let params = NewRequest {
                ride_id: ride.id,
                pickup: pickup(),
            };
            tokio::spawn(async move { engine.create_request(rider, params).await })
        })
        .collect();

    let mut created = vec![];
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => created.push(request),
            Err(err) => assert!(err.is_conflict_error()),
        }
    }

    assert_eq!(created.len(), 1);

    let open = store
        .find_open_request_by_rider(&rider.email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.id, created[0].id);

    let notified = store
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::RequestCreated)
        .count();
    assert_eq!(notified, 1);
}

#[test]
fn accept_seats_rider_and_clears_other_requests() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::entities::{Coordinates, NotificationKind};
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    // stale pending request left over on another ride
    let mut stale = request.clone();
    stale.id = Uuid::new_v4();
    stale.ride_id = Uuid::new_v4();
    block_on(store.put_request(stale.clone()));

    let custom = Location::new(Coordinates { lat: 12.97, lng: 77.61 }, "Trinity".into());
    block_on(engine.accept_request(driver.clone(), request.id, Some(custom.clone()))).unwrap();

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.passengers.len(), 2);
    assert_eq!(ride.passengers[1].request_id, Some(request.id));
    assert_eq!(ride.passengers[1].member, rider.member());
    assert_eq!(ride.passengers[1].pickup, custom);

    let request = block_on(store.find_request(request.id)).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Accepted);
    assert!(block_on(store.find_request(stale.id)).unwrap().is_none());

    let pending: Vec<_> = block_on(engine.list_rider_requests(rider.clone(), None))
        .unwrap()
        .into_iter()
        .filter(|r| r.is_pending())
        .collect();
    assert!(pending.is_empty());

    let last = block_on(store.notifications()).pop().unwrap();
    assert_eq!(last.kind, NotificationKind::RequestAccepted);
    assert_eq!(last.email, rider.email);
    assert_eq!(last.sender_name, driver.name);

    let err = block_on(engine.accept_request(driver, request.id, None)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[test]
fn accept_keeps_rider_history() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::store::RequestStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let first = user("first@example.com");
    let second = user("second@example.com");
    let rider = user("rider@example.com");

    let old_ride = block_on(engine.create_ride(first.clone(), new_ride(3))).unwrap();
    let rejected = join(&engine, &rider, &old_ride).unwrap();
    block_on(engine.reject_request(first, rejected.id)).unwrap();

    let ride = block_on(engine.create_ride(second.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();
    block_on(engine.accept_request(second, request.id, None)).unwrap();

    let kept = block_on(store.find_request(rejected.id)).unwrap().unwrap();
    assert_eq!(kept.status, RequestStatus::Rejected);
}

#[test]
fn accept_for_rider_already_aboard_conflicts() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::RideStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(4))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();
    block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();

    // duplicate pending request for the same seat
    let mut duplicate = request.clone();
    duplicate.id = Uuid::new_v4();
    duplicate.status = RequestStatus::Pending;
    block_on(store.put_request(duplicate.clone()));

    let err = block_on(engine.accept_request(driver, duplicate.id, None)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "rider is already aboard");

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.riders().count(), 1);
}

#[test]
fn accept_defaults_to_requested_pickup() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, pickup, user};
    use crate::store::RideStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(2))).unwrap();
    let request = join(&engine, &user("rider@example.com"), &ride).unwrap();

    block_on(engine.accept_request(driver, request.id, None)).unwrap();

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.passengers[1].pickup, pickup());
}

#[test]
fn accept_by_stranger_or_unknown_request_is_not_found() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &user("rider@example.com"), &ride).unwrap();

    let err = block_on(engine.accept_request(driver, Uuid::new_v4(), None)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = block_on(engine.accept_request(user("mallory@example.com"), request.id, None))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.passengers.len(), 1);

    let request = block_on(store.find_request(request.id)).unwrap().unwrap();
    assert!(request.is_pending());
}

#[test]
fn last_seat_goes_to_first_accept() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let a = user("a@example.com");
    let b = user("b@example.com");

    // one free seat next to the driver
    let ride = block_on(engine.create_ride(driver.clone(), new_ride(2))).unwrap();

    let request_a = join(&engine, &a, &ride).unwrap();
    let request_b = join(&engine, &b, &ride).unwrap();

    block_on(engine.accept_request(driver.clone(), request_a.id, None)).unwrap();

    let err = block_on(engine.accept_request(driver.clone(), request_b.id, None)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "no seats available");

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.passengers.len(), 2);

    let request_b = block_on(store.find_request(request_b.id)).unwrap().unwrap();
    assert_eq!(request_b.status, RequestStatus::Pending);
}

#[test]
fn ride_fills_up_after_three_riders() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::RideStore;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(4))).unwrap();

    for rider in ["r1@example.com", "r2@example.com", "r3@example.com"] {
        let request = join(&engine, &user(rider), &ride).unwrap();
        block_on(engine.accept_request(driver.clone(), request.id, None)).unwrap();
    }

    let err = join(&engine, &user("r4@example.com"), &ride).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let ride = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(ride.passengers.len(), 4);
    assert_eq!(ride.riders().count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_never_overfill() {
    use std::sync::Arc;

    use crate::api::RideAPI;
    use crate::engine::testing::{engine, new_ride, pickup, user};
    use crate::store::RideStore;

    let (engine, store) = engine();
    let engine = Arc::new(engine);
    let driver = user("driver@example.com");

    // three free seats, eight riders waiting
    let ride = engine.create_ride(driver.clone(), new_ride(4)).await.unwrap();

    let mut ids = vec![];
    for i in 0..8 {
        let request = engine
            .create_request(
                user(&format!("rider{}@example.com", i)),
                NewRequest {
                    ride_id: ride.id,
                    pickup: pickup(),
                },
            )
            .await
            .unwrap();
        ids.push(request.id);
    }

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let engine = engine.clone();
            let driver = driver.clone();
            tokio::spawn(async move { engine.accept_request(driver, id, None).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(err) => assert!(err.is_conflict_error() || err.is_not_found_error()),
        }
    }

    assert_eq!(accepted, 3);

    let ride = store.find_ride(ride.id).await.unwrap().unwrap();
    assert_eq!(ride.passengers.len(), 4);
    assert!(ride.passengers.len() as i32 <= ride.seats);
}

#[test]
fn reject_is_driver_only_and_leaves_ride_alone() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::entities::NotificationKind;
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    let err = block_on(engine.reject_request(rider.clone(), request.id)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    block_on(engine.reject_request(driver.clone(), request.id)).unwrap();

    let stored = block_on(store.find_request(request.id)).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Rejected);

    let after = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(after.passengers, ride.passengers);

    let last = block_on(store.notifications()).pop().unwrap();
    assert_eq!(last.kind, NotificationKind::RequestRejected);
    assert_eq!(last.email, rider.email);

    let err = block_on(engine.reject_request(driver.clone(), request.id)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let err = block_on(engine.reject_request(driver, Uuid::new_v4())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // a rejected rider may ask again
    join(&engine, &rider, &ride).unwrap();
}

#[test]
fn delete_only_own_pending_request() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use crate::store::{RequestStore, RideStore};
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    let request = join(&engine, &rider, &ride).unwrap();

    let err = block_on(engine.delete_request(driver, request.id)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    block_on(engine.delete_request(rider.clone(), request.id)).unwrap();
    assert!(block_on(store.find_request(request.id)).unwrap().is_none());

    let after = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(after.passengers, ride.passengers);

    let err = block_on(engine.delete_request(rider, request.id)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn ride_inbox_is_driver_only() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let driver = user("driver@example.com");
    let a = user("a@example.com");
    let b = user("b@example.com");

    let ride = block_on(engine.create_ride(driver.clone(), new_ride(3))).unwrap();
    join(&engine, &a, &ride).unwrap();
    join(&engine, &b, &ride).unwrap();

    let requests = block_on(engine.list_ride_requests(driver, ride.id)).unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].timestamp >= requests[1].timestamp);

    let err = block_on(engine.list_ride_requests(a, ride.id)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let err = block_on(engine.list_ride_requests(b, Uuid::new_v4())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn rider_history_honours_window() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, join, new_ride, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, store) = engine();
    let driver = user("driver@example.com");
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(driver, new_ride(3))).unwrap();
    let recent = join(&engine, &rider, &ride).unwrap();

    let mut old = recent.clone();
    old.id = Uuid::new_v4();
    old.status = RequestStatus::Rejected;
    old.timestamp -= 24 * 60 * 60;
    block_on(store.put_request(old.clone()));

    let ids: Vec<_> = block_on(engine.list_rider_requests(rider.clone(), None))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![recent.id]);

    let ids: Vec<_> = block_on(engine.list_rider_requests(rider.clone(), Some(2 * 24 * 60 * 60)))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![recent.id, old.id]);

    let err = block_on(engine.list_rider_requests(rider, Some(-1))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);
}
