use std::sync::Arc;

use carpool::api::DynAPI;
use carpool::auth::{DynIdentityGate, ForwardedIdentityGate};
use carpool::config::Config;
use carpool::engine::Engine;
use carpool::error::Error;
use carpool::external::GoogleMaps;
use carpool::server::serve;
use carpool::store::{MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let maps = Arc::new(GoogleMaps::new(
        config.maps_api_base.clone(),
        config.maps_api_key.clone(),
    ));

    let engine = match &config.database_url {
        Some(url) => {
            let store = PgStore::new(url, config.database_max_connections).await?;
            Engine::new(Arc::new(store), maps, config.settings)?
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, keeping all state in memory");
            Engine::new(Arc::new(MemoryStore::new()), maps, config.settings)?
        }
    };

    let api = Arc::new(engine) as DynAPI;
    let gate = Arc::new(ForwardedIdentityGate) as DynIdentityGate;

    serve(api, gate, config.server_address).await
}
