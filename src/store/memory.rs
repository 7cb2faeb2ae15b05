use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NotificationSink, RequestStore, RideStore};
use crate::entities::{Coordinates, Notification, Passenger, Request, RequestStatus, Ride, RidePatch};
use crate::error::{conflict_error, Error};

#[derive(Debug, Default)]
struct State {
    rides: HashMap<Uuid, Ride>,
    requests: HashMap<Uuid, Request>,
    notifications: Vec<Notification>,
}

impl State {
    fn active_ride_by_driver(&mut self, email: &str) -> Option<&mut Ride> {
        self.rides
            .values_mut()
            .find(|ride| !ride.complete && ride.driver.email == email)
    }

    fn is_ride_active(&self, id: &Uuid) -> bool {
        self.rides.get(id).map(|ride| !ride.complete).unwrap_or(false)
    }
}

/// Process-local store. Every operation runs under one lock, which makes
/// each of them atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything enqueued so far, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

fn newest_first<T>(mut items: Vec<T>, timestamp: impl Fn(&T) -> i64) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(timestamp(item)));
    items
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        Ok(self.state.lock().await.rides.get(&id).cloned())
    }

    async fn find_active_ride_by_driver(&self, email: &str) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.active_ride_by_driver(email).map(|ride| ride.clone()))
    }

    async fn find_active_ride_by_member(&self, email: &str) -> Result<Option<Ride>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .rides
            .values()
            .find(|ride| !ride.complete && ride.has_member(email))
            .cloned())
    }

    async fn find_joinable_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let state = self.state.lock().await;

        Ok(state.rides.get(&id).filter(|ride| ride.is_joinable()).cloned())
    }

    async fn list_rides_by_driver(&self, email: &str) -> Result<Vec<Ride>, Error> {
        let state = self.state.lock().await;

        let rides: Vec<Ride> = state
            .rides
            .values()
            .filter(|ride| ride.driver.email == email)
            .cloned()
            .collect();

        Ok(newest_first(rides, |ride| ride.timestamp))
    }

    async fn list_rides_by_member(&self, email: &str) -> Result<Vec<Ride>, Error> {
        let state = self.state.lock().await;

        let rides: Vec<Ride> = state
            .rides
            .values()
            .filter(|ride| ride.has_member(email))
            .cloned()
            .collect();

        Ok(newest_first(rides, |ride| ride.timestamp))
    }

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if state.active_ride_by_driver(&ride.driver.email).is_some() {
            return Err(conflict_error("ride already exists"));
        }

        state.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn update_active_ride(
        &self,
        driver_email: &str,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;

        Ok(state.active_ride_by_driver(driver_email).map(|ride| {
            ride.apply(patch);
            ride.clone()
        }))
    }

    async fn complete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;

        match state.active_ride_by_driver(driver_email) {
            Some(ride) => {
                ride.complete()?;
                Ok(Some(ride.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;

        let id = match state.active_ride_by_driver(driver_email) {
            Some(ride) => ride.id,
            None => return Ok(None),
        };

        Ok(state.rides.remove(&id))
    }

    async fn push_passenger(
        &self,
        id: Uuid,
        driver_email: &str,
        passenger: &Passenger,
    ) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;

        let ride = match state.rides.get_mut(&id) {
            Some(ride) if ride.driver.email == driver_email => ride,
            _ => return Ok(None),
        };

        match ride.push_passenger(passenger.clone()) {
            Ok(()) => Ok(Some(ride.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn find_nearby_rides(&self, point: Coordinates, radius: f64) -> Result<Vec<Ride>, Error> {
        let state = self.state.lock().await;

        let mut rides: Vec<(f64, Ride)> = state
            .rides
            .values()
            .filter(|ride| !ride.complete)
            .map(|ride| (ride.distance_to(&point), ride.clone()))
            .filter(|(distance, _)| *distance <= radius)
            .collect();

        rides.sort_by(|(a, _), (b, _)| a.total_cmp(b));

        Ok(rides.into_iter().map(|(_, ride)| ride).collect())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_request(&self, id: Uuid) -> Result<Option<Request>, Error> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn find_open_request_by_rider(&self, email: &str) -> Result<Option<Request>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .requests
            .values()
            .find(|r| r.rider.email == email && r.is_pending() && state.is_ride_active(&r.ride_id))
            .cloned())
    }

    async fn insert_request(&self, request: &Request) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let pending = state
            .requests
            .values()
            .any(|r| r.rider.email == request.rider.email && r.is_pending());

        if pending {
            return Err(conflict_error("request already pending"));
        }

        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn resolve_request(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<Request>, Error> {
        let mut state = self.state.lock().await;

        match state.requests.get_mut(&id) {
            Some(request) if request.is_pending() => {
                request.transition(status)?;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_pending_request(
        &self,
        id: Uuid,
        rider_email: &str,
    ) -> Result<Option<Request>, Error> {
        let mut state = self.state.lock().await;

        let owned = state
            .requests
            .get(&id)
            .map(|r| r.rider.email == rider_email && r.is_pending())
            .unwrap_or(false);

        if !owned {
            return Ok(None);
        }

        Ok(state.requests.remove(&id))
    }

    async fn delete_other_pending_requests(
        &self,
        rider_email: &str,
        keep: Uuid,
    ) -> Result<u64, Error> {
        let mut state = self.state.lock().await;

        let before = state.requests.len();
        state
            .requests
            .retain(|id, r| *id == keep || r.rider.email != rider_email || !r.is_pending());

        Ok((before - state.requests.len()) as u64)
    }

    async fn reject_pending_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let mut state = self.state.lock().await;

        let mut rejected = vec![];
        for request in state.requests.values_mut() {
            if request.ride_id == ride_id && request.is_pending() {
                request.transition(RequestStatus::Rejected)?;
                rejected.push(request.clone());
            }
        }

        Ok(rejected)
    }

    async fn delete_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let mut state = self.state.lock().await;

        let ids: Vec<Uuid> = state
            .requests
            .values()
            .filter(|r| r.ride_id == ride_id)
            .map(|r| r.id)
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| state.requests.remove(id))
            .collect())
    }

    async fn list_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let state = self.state.lock().await;

        let requests: Vec<Request> = state
            .requests
            .values()
            .filter(|r| r.ride_id == ride_id)
            .cloned()
            .collect();

        Ok(newest_first(requests, |r| r.timestamp))
    }

    async fn list_requests_by_rider(&self, email: &str, since: i64) -> Result<Vec<Request>, Error> {
        let state = self.state.lock().await;

        let requests: Vec<Request> = state
            .requests
            .values()
            .filter(|r| r.rider.email == email && r.timestamp > since)
            .cloned()
            .collect();

        Ok(newest_first(requests, |r| r.timestamp))
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn enqueue(&self, notification: &Notification) -> Result<(), Error> {
        self.state.lock().await.notifications.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
impl MemoryStore {
    pub(crate) async fn put_request(&self, request: Request) {
        self.state.lock().await.requests.insert(request.id, request);
    }
}

#[test]
fn second_active_ride_is_rejected() {
    use crate::entities::ride::test_ride;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    block_on(store.insert_ride(&test_ride("d@example.com", 3))).unwrap();

    let err = block_on(store.insert_ride(&test_ride("d@example.com", 2))).unwrap_err();
    assert!(err.is_conflict_error());

    block_on(store.complete_active_ride("d@example.com"))
        .unwrap()
        .unwrap();
    block_on(store.insert_ride(&test_ride("d@example.com", 2))).unwrap();
}

#[test]
fn second_pending_request_is_rejected() {
    use crate::entities::ride::{test_member, test_ride};
    use crate::entities::NewRequest;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let a = test_ride("a@example.com", 3);
    let b = test_ride("b@example.com", 3);
    for ride in [&a, &b] {
        block_on(store.insert_ride(ride)).unwrap();
    }

    let request_for = |ride: &Ride| {
        Request::new(
            test_member("r@example.com"),
            NewRequest {
                ride_id: ride.id,
                pickup: ride.passengers[0].pickup.clone(),
            },
        )
    };

    let first = request_for(&a);
    block_on(store.insert_request(&first)).unwrap();

    let err = block_on(store.insert_request(&request_for(&b))).unwrap_err();
    assert!(err.is_conflict_error());

    block_on(store.resolve_request(first.id, RequestStatus::Rejected))
        .unwrap()
        .unwrap();
    block_on(store.insert_request(&request_for(&b))).unwrap();
}

#[test]
fn push_passenger_filters_on_owner() {
    use crate::entities::ride::{test_member, test_ride};
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = test_ride("d@example.com", 3);
    block_on(store.insert_ride(&ride)).unwrap();

    let passenger = Passenger::rider(
        Uuid::new_v4(),
        test_member("r@example.com"),
        ride.passengers[0].pickup.clone(),
    );

    let result = block_on(store.push_passenger(ride.id, "other@example.com", &passenger)).unwrap();
    assert!(result.is_none());

    let result = block_on(store.push_passenger(ride.id, "d@example.com", &passenger)).unwrap();
    assert_eq!(result.unwrap().passengers.len(), 2);
}

#[test]
fn nearby_rides_are_sorted_and_bounded() {
    use crate::entities::ride::test_ride;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let mut near = test_ride("near@example.com", 3);
    near.geo = vec![Coordinates { lat: 12.971, lng: 77.601 }; 3];
    let mut nearer = test_ride("nearer@example.com", 3);
    nearer.geo = vec![Coordinates { lat: 12.9701, lng: 77.6001 }; 3];
    let mut far = test_ride("far@example.com", 3);
    far.geo = vec![Coordinates { lat: 13.5, lng: 78.5 }; 3];

    for ride in [&near, &nearer, &far] {
        block_on(store.insert_ride(ride)).unwrap();
    }

    let origin = Coordinates { lat: 12.97, lng: 77.60 };
    let rides = block_on(store.find_nearby_rides(origin, 5000.0)).unwrap();

    let ids: Vec<Uuid> = rides.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![nearer.id, near.id]);
}
