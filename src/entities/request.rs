use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Location, Member, Passenger};
use crate::error::{invalid_invocation_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rider: Member,
    pub pickup: Location,
    pub timestamp: i64,
    pub status: Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRequest {
    pub ride_id: Uuid,
    pub pickup: Location,
}

impl Request {
    pub fn new(rider: Member, params: NewRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id: params.ride_id,
            rider,
            pickup: params.pickup,
            timestamp: Utc::now().timestamp(),
            status: Status::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Moves a pending request to `to`. Terminal states never change again.
    pub fn transition(&mut self, to: Status) -> Result<(), Error> {
        match (self.status, to) {
            (Status::Pending, Status::Accepted) | (Status::Pending, Status::Rejected) => {
                self.status = to;
                Ok(())
            }
            _ => Err(invalid_invocation_error()),
        }
    }

    pub fn passenger(&self, pickup: Option<Location>) -> Passenger {
        Passenger::rider(
            self.id,
            self.rider.clone(),
            pickup.unwrap_or_else(|| self.pickup.clone()),
        )
    }
}

#[cfg(test)]
fn test_request() -> Request {
    use crate::entities::Coordinates;

    Request::new(
        crate::entities::ride::test_member("rider@example.com"),
        NewRequest {
            ride_id: Uuid::new_v4(),
            pickup: Location::new(Coordinates { lat: 12.9, lng: 77.6 }, "Domlur".into()),
        },
    )
}

#[test]
fn new_request_is_pending() {
    let request = test_request();
    assert!(request.is_pending());
    assert!(request.timestamp > 0);
}

#[test]
fn transitions_leave_pending_once() {
    let mut request = test_request();
    request.transition(Status::Accepted).unwrap();
    assert_eq!(request.status, Status::Accepted);

    assert!(request.transition(Status::Rejected).is_err());
    assert!(request.transition(Status::Pending).is_err());

    let mut request = test_request();
    assert!(request.transition(Status::Pending).is_err());
    request.transition(Status::Rejected).unwrap();
    assert!(request.transition(Status::Accepted).is_err());
}

#[test]
fn status_serializes_as_name() {
    for status in [Status::Pending, Status::Accepted, Status::Rejected] {
        assert_eq!(serde_json::to_value(status).unwrap(), status.name());
    }
}

#[test]
fn passenger_defaults_to_request_pickup() {
    use crate::entities::Coordinates;

    let request = test_request();

    let passenger = request.passenger(None);
    assert_eq!(passenger.request_id, Some(request.id));
    assert_eq!(passenger.pickup, request.pickup);

    let confirmed = Location::new(Coordinates { lat: 12.95, lng: 77.61 }, "Gate 2".into());
    let passenger = request.passenger(Some(confirmed.clone()));
    assert_eq!(passenger.pickup, confirmed);
    assert_eq!(passenger.member, request.rider);
}
