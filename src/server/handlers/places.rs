use axum::extract::{Extension, Json, Query};
use serde::{Deserialize, Serialize};

use crate::api::DynAPI;
use crate::auth::User;
use crate::error::Error;
use crate::external::PlaceSuggestion;

#[derive(Serialize, Deserialize)]
pub struct SuggestionParams {
    input: String,
}

pub async fn suggestions(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<PlaceSuggestion>>, Error> {
    let suggestions = api.suggest_places(user, params.input).await?;

    Ok(suggestions.into())
}
