use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Geocoder, RoutingResolver};
use crate::{
    entities::Coordinates,
    error::{invalid_input_error, not_found_error, upstream_error, Error},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Place {
    pub place_id: Option<String>,
    pub formatted_address: Option<String>,
    pub geometry: Geometry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Geometry {
    pub location: Coordinates,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub place_id: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectionsRoute {
    pub legs: Vec<Leg>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Leg {
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub start_location: Coordinates,
    pub end_location: Coordinates,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response<T> {
    status: String,
    result: Option<T>,
    routes: Option<T>,
    predictions: Option<T>,
}

const MAX_SUGGESTIONS: usize = 6;

#[derive(Clone, Debug)]
pub struct GoogleMaps {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GoogleMaps {
    pub fn new(api_base: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
        }
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<Response<T>, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("https://{}{}", self.api_base, path);

        let res = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code != 200 {
            tracing::warn!("maps api answered with status {}", status_code);
            return Err(upstream_error());
        }

        Ok(res.json().await?)
    }
}

/// Start of every step of the first leg, then the end of the last step.
pub fn route_points(routes: &[DirectionsRoute]) -> Result<Vec<Coordinates>, Error> {
    let steps = &routes
        .first()
        .and_then(|route| route.legs.first())
        .ok_or_else(upstream_error)?
        .steps;

    let last = steps.last().ok_or_else(upstream_error)?;

    let mut points: Vec<Coordinates> = steps.iter().map(|step| step.start_location).collect();
    points.push(last.end_location);

    Ok(points)
}

fn suggestions(data: Response<Vec<PlaceSuggestion>>) -> Result<Vec<PlaceSuggestion>, Error> {
    match data.status.as_str() {
        "OK" | "ZERO_RESULTS" => {}
        "INVALID_REQUEST" => return Err(invalid_input_error("invalid place input")),
        status => {
            tracing::warn!("autocomplete failed with status {}", status);
            return Err(upstream_error());
        }
    }

    let mut predictions = data.predictions.unwrap_or_default();
    predictions.truncate(MAX_SUGGESTIONS);

    Ok(predictions)
}

fn place_status_error(status: &str) -> Error {
    match status {
        "NOT_FOUND" | "ZERO_RESULTS" | "INVALID_REQUEST" => not_found_error("place not found"),
        _ => upstream_error(),
    }
}

#[async_trait]
impl RoutingResolver for GoogleMaps {
    #[tracing::instrument(skip(self))]
    async fn find_route(&self, origin: &str, destination: &str) -> Result<Vec<Coordinates>, Error> {
        let data: Response<Vec<DirectionsRoute>> = self
            .get(
                "/maps/api/directions/json",
                &[("origin", origin), ("destination", destination)],
            )
            .await?;

        if data.status != "OK" {
            tracing::warn!("directions lookup failed with status {}", data.status);
            return Err(upstream_error());
        }

        route_points(&data.routes.unwrap_or_default())
    }
}

#[async_trait]
impl Geocoder for GoogleMaps {
    #[tracing::instrument(skip(self))]
    async fn find_coordinates(&self, place_id: &str) -> Result<Coordinates, Error> {
        let data: Response<Place> = self
            .get(
                "/maps/api/place/details/json",
                &[("place_id", place_id), ("fields", "geometry")],
            )
            .await?;

        if data.status != "OK" {
            return Err(place_status_error(&data.status));
        }

        let place = data.result.ok_or_else(upstream_error)?;

        Ok(place.geometry.location)
    }

    #[tracing::instrument(skip(self))]
    async fn suggest_places(&self, input: &str) -> Result<Vec<PlaceSuggestion>, Error> {
        let data: Response<Vec<PlaceSuggestion>> = self
            .get("/maps/api/place/autocomplete/json", &[("input", input)])
            .await?;

        suggestions(data)
    }
}

#[test]
fn route_points_from_directions() {
    let body = serde_json::json!({
        "status": "OK",
        "routes": [{
            "legs": [{
                "steps": [
                    {
                        "start_location": { "lat": 12.97, "lng": 77.59 },
                        "end_location": { "lat": 12.98, "lng": 77.62 }
                    },
                    {
                        "start_location": { "lat": 12.98, "lng": 77.62 },
                        "end_location": { "lat": 12.99, "lng": 77.70 }
                    }
                ]
            }]
        }]
    });

    let data: Response<Vec<DirectionsRoute>> = serde_json::from_value(body).unwrap();
    let points = route_points(&data.routes.unwrap()).unwrap();

    assert_eq!(
        points,
        vec![
            Coordinates { lat: 12.97, lng: 77.59 },
            Coordinates { lat: 12.98, lng: 77.62 },
            Coordinates { lat: 12.99, lng: 77.70 },
        ]
    );
}

#[test]
fn empty_directions_are_unavailable() {
    use crate::error::ErrorKind;

    let err = route_points(&[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);

    let err = route_points(&[DirectionsRoute {
        legs: vec![Leg { steps: vec![] }],
    }])
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
}

#[test]
fn place_details_decode() {
    let body = serde_json::json!({
        "status": "OK",
        "result": { "geometry": { "location": { "lat": 28.61, "lng": 77.21 } } }
    });

    let data: Response<Place> = serde_json::from_value(body).unwrap();
    let place = data.result.unwrap();
    assert_eq!(place.geometry.location, Coordinates { lat: 28.61, lng: 77.21 });
}

#[test]
fn place_status_mapping() {
    use crate::error::ErrorKind;

    assert_eq!(place_status_error("NOT_FOUND").kind, ErrorKind::NotFound);
    assert_eq!(place_status_error("OVER_QUERY_LIMIT").kind, ErrorKind::Unavailable);
}

#[test]
fn autocomplete_predictions_decode() {
    let body = serde_json::json!({
        "status": "OK",
        "predictions": [
            {
                "description": "Connaught Place, New Delhi, Delhi, India",
                "place_id": "ChIJ5-ZMxJb9DDkRxSbTcBe2AQk",
                "matched_substrings": [{ "length": 9, "offset": 0 }],
                "types": ["sublocality", "political"]
            },
            {
                "description": "Connaught Road, Kolkata, West Bengal, India",
                "place_id": "ChIJb9cZ1Ah4AjoR0NpYT3Ft_08"
            }
        ]
    });

    let data: Response<Vec<PlaceSuggestion>> = serde_json::from_value(body).unwrap();
    let predictions = suggestions(data).unwrap();

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].place_id, "ChIJ5-ZMxJb9DDkRxSbTcBe2AQk");
    assert_eq!(predictions[1].description, "Connaught Road, Kolkata, West Bengal, India");
}

#[test]
fn autocomplete_statuses() {
    use crate::error::ErrorKind;

    let empty: Response<Vec<PlaceSuggestion>> =
        serde_json::from_value(serde_json::json!({ "status": "ZERO_RESULTS", "predictions": [] }))
            .unwrap();
    assert!(suggestions(empty).unwrap().is_empty());

    let invalid: Response<Vec<PlaceSuggestion>> =
        serde_json::from_value(serde_json::json!({ "status": "INVALID_REQUEST" })).unwrap();
    assert_eq!(suggestions(invalid).unwrap_err().kind, ErrorKind::Invalid);

    let denied: Response<Vec<PlaceSuggestion>> =
        serde_json::from_value(serde_json::json!({ "status": "REQUEST_DENIED" })).unwrap();
    assert_eq!(suggestions(denied).unwrap_err().kind, ErrorKind::Unavailable);
}

#[test]
fn autocomplete_is_capped() {
    let predictions: Vec<_> = (0..10)
        .map(|i| serde_json::json!({ "description": format!("Place {}", i), "place_id": format!("id-{}", i) }))
        .collect();

    let data: Response<Vec<PlaceSuggestion>> =
        serde_json::from_value(serde_json::json!({ "status": "OK", "predictions": predictions }))
            .unwrap();

    assert_eq!(suggestions(data).unwrap().len(), MAX_SUGGESTIONS);
}
