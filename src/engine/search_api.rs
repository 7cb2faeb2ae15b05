use async_trait::async_trait;

use super::Engine;
use crate::{
    api::SearchAPI,
    auth::User,
    entities::Ride,
    error::{invalid_input_error, Error},
    external::PlaceSuggestion,
};

#[async_trait]
impl SearchAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_nearby_rides(
        &self,
        _user: User,
        place_id: String,
        radius: Option<f64>,
    ) -> Result<Vec<Ride>, Error> {
        let radius = radius.unwrap_or(self.settings.search_radius);

        if !radius.is_finite() || radius <= 0.0 {
            return Err(invalid_input_error("radius must be positive"));
        }

        let point = self.geocoder.find_coordinates(&place_id).await?;

        let rides = self.rides.find_nearby_rides(point, radius).await?;

        tracing::info!(found = rides.len(), "nearby rides");

        Ok(rides)
    }

    #[tracing::instrument(skip(self))]
    async fn suggest_places(
        &self,
        _user: User,
        input: String,
    ) -> Result<Vec<PlaceSuggestion>, Error> {
        let input = input.trim();

        if input.is_empty() {
            return Err(invalid_input_error("input is required"));
        }

        self.geocoder.suggest_places(input).await
    }
}

#[test]
fn finds_active_rides_near_place() {
    use crate::api::RideAPI;
    use crate::engine::testing::{engine, new_ride, user};
    use tokio_test::block_on;

    let (engine, _) = engine();
    let rider = user("rider@example.com");

    let ride = block_on(engine.create_ride(user("driver@example.com"), new_ride(3))).unwrap();
    let done = block_on(engine.create_ride(user("done@example.com"), new_ride(3))).unwrap();
    block_on(engine.complete_ride(user("done@example.com"))).unwrap();

    let rides =
        block_on(engine.find_nearby_rides(rider.clone(), "place-whitefield".into(), None)).unwrap();
    let ids: Vec<_> = rides.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![ride.id]);
    assert!(!ids.contains(&done.id));

    let rides =
        block_on(engine.find_nearby_rides(rider, "place-mysore".into(), Some(5000.0))).unwrap();
    assert!(rides.is_empty());
}

#[test]
fn bad_radius_or_place() {
    use crate::engine::testing::{engine, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let rider = user("rider@example.com");

    let err = block_on(engine.find_nearby_rides(rider.clone(), "place-mg-road".into(), Some(0.0)))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);

    let err = block_on(engine.find_nearby_rides(rider, "unknown".into(), None)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn place_suggestions_for_partial_input() {
    use crate::engine::testing::{engine, user};
    use crate::error::ErrorKind;
    use tokio_test::block_on;

    let (engine, _) = engine();
    let rider = user("rider@example.com");

    let suggestions = block_on(engine.suggest_places(rider.clone(), " m".into())).unwrap();
    let ids: Vec<_> = suggestions.iter().map(|s| s.place_id.as_str()).collect();
    assert_eq!(ids, vec!["place-mg-road", "place-mysore"]);
    assert_eq!(suggestions[0].description, "mg road");

    assert!(block_on(engine.suggest_places(rider.clone(), "airport".into()))
        .unwrap()
        .is_empty());

    let err = block_on(engine.suggest_places(rider, "   ".into())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Invalid);
}
