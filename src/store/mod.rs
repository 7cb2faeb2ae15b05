mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{Coordinates, Notification, Passenger, Request, RequestStatus, Ride, RidePatch};
use crate::error::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for ride aggregates.
///
/// "Active" always means `complete = false`. Implementations must reject a
/// second active ride for the same driver with a conflict error on insert.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    async fn find_active_ride_by_driver(&self, email: &str) -> Result<Option<Ride>, Error>;

    /// Active ride listing `email` among its passengers, driver included.
    async fn find_active_ride_by_member(&self, email: &str) -> Result<Option<Ride>, Error>;

    /// Active ride `id` if it still has a free seat.
    async fn find_joinable_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    async fn list_rides_by_driver(&self, email: &str) -> Result<Vec<Ride>, Error>;

    async fn list_rides_by_member(&self, email: &str) -> Result<Vec<Ride>, Error>;

    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn update_active_ride(
        &self,
        driver_email: &str,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, Error>;

    async fn complete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error>;

    async fn delete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error>;

    /// Appends `passenger` to ride `id` as one atomic step, only if the ride
    /// belongs to `driver_email`, is active, has a free seat and does not
    /// already carry the passenger. Returns `None` when nothing matched.
    async fn push_passenger(
        &self,
        id: Uuid,
        driver_email: &str,
        passenger: &Passenger,
    ) -> Result<Option<Ride>, Error>;

    /// Active rides within `radius` meters of `point`, nearest first.
    async fn find_nearby_rides(&self, point: Coordinates, radius: f64) -> Result<Vec<Ride>, Error>;
}

/// Persistence for join requests.
///
/// Implementations must reject a second pending request for the same rider
/// with a conflict error on insert.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: Uuid) -> Result<Option<Request>, Error>;

    /// Pending request by `email` whose ride is still active.
    async fn find_open_request_by_rider(&self, email: &str) -> Result<Option<Request>, Error>;

    async fn insert_request(&self, request: &Request) -> Result<(), Error>;

    /// Moves request `id` from pending to `status`; `None` if it was not pending.
    async fn resolve_request(&self, id: Uuid, status: RequestStatus)
        -> Result<Option<Request>, Error>;

    async fn delete_pending_request(&self, id: Uuid, rider_email: &str)
        -> Result<Option<Request>, Error>;

    /// Deletes the rider's pending requests other than `keep`.
    async fn delete_other_pending_requests(&self, rider_email: &str, keep: Uuid)
        -> Result<u64, Error>;

    async fn reject_pending_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error>;

    async fn delete_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error>;

    async fn list_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error>;

    async fn list_requests_by_rider(&self, email: &str, since: i64) -> Result<Vec<Request>, Error>;
}

/// Durable append-only outbox of user-facing events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, notification: &Notification) -> Result<(), Error>;
}
