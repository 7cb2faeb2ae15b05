mod location;
mod member;
mod notification;
mod passenger;
pub(crate) mod request;
pub(crate) mod ride;

pub use location::{Coordinates, Location};
pub use member::Member;
pub use notification::{Kind as NotificationKind, Notification};
pub use passenger::Passenger;
pub use request::{NewRequest, Request, Status as RequestStatus};
pub use ride::{NewRide, Ride, RidePatch};
