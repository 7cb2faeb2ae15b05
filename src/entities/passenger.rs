use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Location, Member};

/// A confirmed occupant of a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    /// `None` for the driver, who is seated when the ride is created.
    pub request_id: Option<Uuid>,
    #[serde(flatten)]
    pub member: Member,
    pub pickup: Location,
}

impl Passenger {
    pub fn driver(member: Member, pickup: Location) -> Self {
        Self {
            request_id: None,
            member,
            pickup,
        }
    }

    pub fn rider(request_id: Uuid, member: Member, pickup: Location) -> Self {
        Self {
            request_id: Some(request_id),
            member,
            pickup,
        }
    }

    pub fn is_driver(&self) -> bool {
        self.request_id.is_none()
    }
}

#[test]
fn member_fields_are_flattened() {
    use crate::entities::Coordinates;

    let passenger = Passenger::rider(
        Uuid::new_v4(),
        Member {
            email: "a@example.com".into(),
            phone: "9999999999".into(),
            name: "A".into(),
        },
        Location::new(Coordinates { lat: 12.9, lng: 77.6 }, "Indiranagar".into()),
    );

    let value = serde_json::to_value(&passenger).unwrap();
    assert_eq!(value["email"], "a@example.com");
    assert!(value.get("member").is_none());

    let decoded: Passenger = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, passenger);
    assert!(!decoded.is_driver());
}
