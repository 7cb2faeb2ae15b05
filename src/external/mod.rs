pub mod google_maps;

use async_trait::async_trait;

use crate::entities::Coordinates;
use crate::error::Error;

pub use google_maps::{GoogleMaps, PlaceSuggestion};

#[async_trait]
pub trait RoutingResolver: Send + Sync {
    /// Ordered route points from `origin` to `destination`, both included.
    async fn find_route(&self, origin: &str, destination: &str) -> Result<Vec<Coordinates>, Error>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn find_coordinates(&self, place_id: &str) -> Result<Coordinates, Error>;

    /// Autocomplete candidates for a partially typed place name.
    async fn suggest_places(&self, input: &str) -> Result<Vec<PlaceSuggestion>, Error>;
}
