use oso::{Oso, PolarClass};

use crate::auth::User;
use crate::entities::Ride;
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(User::get_polar_class())?;
    o.register_class(Ride::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[test]
fn driver_manages_own_ride_requests() {
    use crate::entities::ride::test_ride;

    let authorizor = new().unwrap();

    let driver = User::new("driver@example.com", "9876543210", "driver");
    let ride = test_ride(&driver.email, 3);

    let result = authorizor.is_allowed(driver.clone(), "manage_requests", ride.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn other_users_cannot_manage_ride_requests() {
    use crate::entities::ride::test_ride;

    let authorizor = new().unwrap();

    let rider = User::new("rider@example.com", "9876543210", "rider");
    let ride = test_ride("driver@example.com", 3);

    let result = authorizor.is_allowed(rider.clone(), "manage_requests", ride.clone());
    assert_eq!(result.unwrap(), false);

    let driver = User::new("driver@example.com", "9876543210", "driver");
    let result = authorizor.is_allowed(driver, "delete_ride", ride);
    assert_eq!(result.unwrap(), false);
}
