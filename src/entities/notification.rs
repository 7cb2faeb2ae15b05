use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Member, Ride};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Kind {
    RequestCreated = 0,
    RequestAccepted = 1,
    RequestRejected = 2,
    RideCancelled = 3,
}

impl From<Kind> for i32 {
    fn from(kind: Kind) -> Self {
        kind as i32
    }
}

impl TryFrom<i32> for Kind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::RequestCreated),
            1 => Ok(Self::RequestAccepted),
            2 => Ok(Self::RequestRejected),
            3 => Ok(Self::RideCancelled),
            _ => Err(format!("unknown notification type {}", value)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub email: String,
    pub sender_phone: String,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    pub content: String,
    pub timestamp: i64,
}

impl Notification {
    fn new(recipient: &str, sender: &Member, kind: Kind, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: recipient.into(),
            sender_phone: sender.phone.clone(),
            sender_name: sender.name.clone(),
            kind,
            content,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn request_created(ride: &Ride, rider: &Member) -> Self {
        let content = format!(
            "New request from {} has been made for the ride {}",
            rider.name, ride.id
        );

        Self::new(&ride.driver.email, rider, Kind::RequestCreated, content)
    }

    pub fn request_accepted(rider_email: &str, driver: &Member) -> Self {
        let content = format!(
            "Your request for the ride has been ACCEPTED by the driver {}",
            driver.name
        );

        Self::new(rider_email, driver, Kind::RequestAccepted, content)
    }

    pub fn request_rejected(rider_email: &str, driver: &Member) -> Self {
        let content = format!(
            "Your request for the ride has been DECLINED by the driver {}",
            driver.name
        );

        Self::new(rider_email, driver, Kind::RequestRejected, content)
    }

    pub fn ride_cancelled(rider_email: &str, ride: &Ride) -> Self {
        let content = format!(
            "The ride from {} to {} has been CANCELLED by the driver {}",
            ride.origin, ride.destination, ride.driver.name
        );

        Self::new(rider_email, &ride.driver, Kind::RideCancelled, content)
    }
}

#[test]
fn kind_is_numeric_on_the_wire() {
    let value = serde_json::to_value(Kind::RequestRejected).unwrap();
    assert_eq!(value, serde_json::json!(2));

    let kind: Kind = serde_json::from_value(serde_json::json!(1)).unwrap();
    assert_eq!(kind, Kind::RequestAccepted);

    assert!(serde_json::from_value::<Kind>(serde_json::json!(7)).is_err());
}

#[test]
fn request_created_goes_to_driver() {
    let ride = crate::entities::ride::test_ride("driver@example.com", 3);
    let rider = crate::entities::ride::test_member("rider@example.com");

    let notification = Notification::request_created(&ride, &rider);
    assert_eq!(notification.email, "driver@example.com");
    assert_eq!(notification.sender_name, "rider");
    assert_eq!(notification.kind, Kind::RequestCreated);
    assert!(notification.content.contains(&ride.id.to_string()));
}
