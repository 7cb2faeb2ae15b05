use async_trait::async_trait;
use geo_types::Geometry;
use geozero::wkb;
use serde::de::DeserializeOwned;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Acquire, Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{NotificationSink, RequestStore, RideStore};
use crate::{
    entities::{Coordinates, Notification, Passenger, Request, RequestStatus, Ride, RidePatch},
    error::{conflict_error, database_error, Error},
};

type Database = Postgres;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        // TODO: move this to migrations
        pool.execute("CREATE EXTENSION IF NOT EXISTS postgis")
            .await?;

        // ride service
        pool.execute("CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, driver_email VARCHAR NOT NULL, complete BOOLEAN NOT NULL, seats INT4 NOT NULL, departs_at INT8 NOT NULL, geo geometry(MultiPoint, 4326) NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS rides_one_active_per_driver ON rides (driver_email) WHERE NOT complete")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_geo ON rides USING GIST ((geo::geography))")
            .await?;

        // request service
        pool.execute("CREATE TABLE IF NOT EXISTS requests (id UUID PRIMARY KEY, ride_id UUID NOT NULL, rider_email VARCHAR NOT NULL, status VARCHAR NOT NULL, created_at INT8 NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS requests_one_pending_per_rider ON requests (rider_email) WHERE status = 'pending'")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS requests_ride ON requests (ride_id)")
            .await?;

        // notification outbox
        pool.execute("CREATE TABLE IF NOT EXISTS notifications (id UUID PRIMARY KEY, recipient_email VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;

        Ok(Self { pool })
    }
}

fn decode<T: DeserializeOwned>(row: &PgRow) -> Result<T, Error> {
    let Json(value): Json<T> = row.try_get("data")?;

    Ok(value)
}

fn decode_optional<T: DeserializeOwned>(row: Option<PgRow>) -> Result<Option<T>, Error> {
    row.as_ref().map(decode::<T>).transpose()
}

fn decode_all<T: DeserializeOwned>(rows: Vec<PgRow>) -> Result<Vec<T>, Error> {
    rows.iter().map(decode::<T>).collect()
}

fn insert_error(err: sqlx::Error, conflict: &str) -> Error {
    let is_unique_violation = match &err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    };

    if is_unique_violation {
        tracing::info!("unique constraint rejected insert: {}", conflict);
        return conflict_error(conflict);
    }

    database_error(err)
}

#[tracing::instrument(skip(tx))]
async fn fetch_active_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    driver_email: &str,
) -> Result<Option<Ride>, Error> {
    let row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM rides WHERE driver_email = $1 AND NOT complete FOR UPDATE")
                .bind(driver_email),
        )
        .await?;

    decode_optional(row)
}

#[tracing::instrument(skip(tx, ride), fields(ride_id = %ride.id))]
async fn update_ride(tx: &mut Transaction<'_, Database>, ride: &Ride) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE rides SET complete = $2, departs_at = $3, data = $4 WHERE id = $1")
            .bind(&ride.id)
            .bind(ride.complete)
            .bind(ride.timestamp)
            .bind(Json(ride)),
    )
    .await?;

    Ok(())
}

#[async_trait]
impl RideStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_ride_by_driver(&self, email: &str) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM rides WHERE driver_email = $1 AND NOT complete")
                    .bind(email),
            )
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_ride_by_member(&self, email: &str) -> Result<Option<Ride>, Error> {
        let query = "
            SELECT data FROM rides
            WHERE
                NOT complete
                AND data->'passengers' @> jsonb_build_array(jsonb_build_object('email', $1::text))
            LIMIT 1
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn.fetch_optional(sqlx::query(query).bind(email)).await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn find_joinable_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let query = "
            SELECT data FROM rides
            WHERE
                id = $1
                AND NOT complete
                AND seats > jsonb_array_length(data->'passengers')
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn.fetch_optional(sqlx::query(query).bind(&id)).await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides_by_driver(&self, email: &str) -> Result<Vec<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM rides WHERE driver_email = $1 ORDER BY departs_at DESC")
                    .bind(email),
            )
            .await?;

        decode_all(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides_by_member(&self, email: &str) -> Result<Vec<Ride>, Error> {
        let query = "
            SELECT data FROM rides
            WHERE data->'passengers' @> jsonb_build_array(jsonb_build_object('email', $1::text))
            ORDER BY departs_at DESC
        ";

        let mut conn = self.pool.acquire().await?;
        let rows = conn.fetch_all(sqlx::query(query).bind(email)).await?;

        decode_all(rows)
    }

    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO rides (id, driver_email, complete, seats, departs_at, geo, data) VALUES ($1, $2, $3, $4, $5, ST_SetSRID($6, 4326), $7)")
                .bind(&ride.id)
                .bind(&ride.driver.email)
                .bind(ride.complete)
                .bind(ride.seats)
                .bind(ride.timestamp)
                .bind(wkb::Encode(ride.geometry()))
                .bind(Json(ride)),
        )
        .await
        .map_err(|err| insert_error(err, "ride already exists"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update_active_ride(
        &self,
        driver_email: &str,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut ride = match fetch_active_ride_for_update(&mut tx, driver_email).await? {
            Some(ride) => ride,
            None => return Ok(None),
        };

        ride.apply(patch);

        update_ride(&mut tx, &ride).await?;

        tx.commit().await?;

        Ok(Some(ride))
    }

    #[tracing::instrument(skip(self))]
    async fn complete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error> {
        let query = "
            UPDATE rides
            SET complete = TRUE, data = jsonb_set(data, '{complete}', 'true'::jsonb)
            WHERE driver_email = $1 AND NOT complete
            RETURNING data
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn.fetch_optional(sqlx::query(query).bind(driver_email)).await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_active_ride(&self, driver_email: &str) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(
                sqlx::query("DELETE FROM rides WHERE driver_email = $1 AND NOT complete RETURNING data")
                    .bind(driver_email),
            )
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self, passenger))]
    async fn push_passenger(
        &self,
        id: Uuid,
        driver_email: &str,
        passenger: &Passenger,
    ) -> Result<Option<Ride>, Error> {
        // single statement: the row lock makes concurrent pushes re-check the
        // seat count against the committed passenger list
        let query = "
            UPDATE rides
            SET data = jsonb_set(data, '{passengers}', (data->'passengers') || jsonb_build_array($3::jsonb))
            WHERE
                id = $1
                AND driver_email = $2
                AND NOT complete
                AND seats > jsonb_array_length(data->'passengers')
                AND NOT data->'passengers' @> jsonb_build_array(jsonb_build_object('email', $4::text))
            RETURNING data
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn
            .fetch_optional(
                sqlx::query(query)
                    .bind(&id)
                    .bind(driver_email)
                    .bind(Json(passenger))
                    .bind(&passenger.member.email),
            )
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn find_nearby_rides(&self, point: Coordinates, radius: f64) -> Result<Vec<Ride>, Error> {
        let point: Geometry<f64> = point.into();

        let query = "
            SELECT data FROM rides
            WHERE
                NOT complete
                AND ST_DWithin(geo::geography, ST_SetSRID($1, 4326)::geography, $2)
            ORDER BY
                ST_Distance(geo::geography, ST_SetSRID($1, 4326)::geography) ASC
        ";

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(sqlx::query(query).bind(wkb::Encode(point)).bind(radius))
            .await?;

        decode_all(rows)
    }
}

#[async_trait]
impl RequestStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_request(&self, id: Uuid) -> Result<Option<Request>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(sqlx::query("SELECT data FROM requests WHERE id = $1").bind(&id))
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn find_open_request_by_rider(&self, email: &str) -> Result<Option<Request>, Error> {
        let query = "
            SELECT r.data AS data
            FROM
                requests r
                JOIN rides d ON d.id = r.ride_id
            WHERE
                r.rider_email = $1
                AND r.status = 'pending'
                AND NOT d.complete
            LIMIT 1
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn.fetch_optional(sqlx::query(query).bind(email)).await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_request(&self, request: &Request) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO requests (id, ride_id, rider_email, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(&request.id)
                .bind(&request.ride_id)
                .bind(&request.rider.email)
                .bind(request.status.name())
                .bind(request.timestamp)
                .bind(Json(request)),
        )
        .await
        .map_err(|err| insert_error(err, "request already pending"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_request(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<Request>, Error> {
        let query = "
            UPDATE requests
            SET status = $2, data = jsonb_set(data, '{status}', to_jsonb($2::text))
            WHERE id = $1 AND status = 'pending'
            RETURNING data
        ";

        let mut conn = self.pool.acquire().await?;
        let row = conn
            .fetch_optional(sqlx::query(query).bind(&id).bind(status.name()))
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_pending_request(
        &self,
        id: Uuid,
        rider_email: &str,
    ) -> Result<Option<Request>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(
                sqlx::query("DELETE FROM requests WHERE id = $1 AND rider_email = $2 AND status = 'pending' RETURNING data")
                    .bind(&id)
                    .bind(rider_email),
            )
            .await?;

        decode_optional(row)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_other_pending_requests(
        &self,
        rider_email: &str,
        keep: Uuid,
    ) -> Result<u64, Error> {
        let mut conn = self.pool.acquire().await?;

        let result = conn
            .execute(
                sqlx::query("DELETE FROM requests WHERE rider_email = $1 AND status = 'pending' AND id <> $2")
                    .bind(rider_email)
                    .bind(&keep),
            )
            .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn reject_pending_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let query = "
            UPDATE requests
            SET status = 'rejected', data = jsonb_set(data, '{status}', '\"rejected\"'::jsonb)
            WHERE ride_id = $1 AND status = 'pending'
            RETURNING data
        ";

        let mut conn = self.pool.acquire().await?;
        let rows = conn.fetch_all(sqlx::query(query).bind(&ride_id)).await?;

        decode_all(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("DELETE FROM requests WHERE ride_id = $1 RETURNING data").bind(&ride_id),
            )
            .await?;

        decode_all(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn list_requests_for_ride(&self, ride_id: Uuid) -> Result<Vec<Request>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM requests WHERE ride_id = $1 ORDER BY created_at DESC")
                    .bind(&ride_id),
            )
            .await?;

        decode_all(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn list_requests_by_rider(&self, email: &str, since: i64) -> Result<Vec<Request>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM requests WHERE rider_email = $1 AND created_at > $2 ORDER BY created_at DESC")
                    .bind(email)
                    .bind(since),
            )
            .await?;

        decode_all(rows)
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    #[tracing::instrument(skip(self, notification), fields(kind = ?notification.kind))]
    async fn enqueue(&self, notification: &Notification) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO notifications (id, recipient_email, data) VALUES ($1, $2, $3)")
                .bind(&notification.id)
                .bind(&notification.email)
                .bind(Json(notification)),
        )
        .await?;

        Ok(())
    }
}

#[test]
#[ignore = "requires a PostGIS database at DATABASE_URL"]
fn push_passenger_stops_at_capacity() {
    use crate::entities::ride::{test_member, test_ride};
    use tokio_test::block_on;

    let db_uri = std::env::var("DATABASE_URL").unwrap();
    let store = block_on(PgStore::new(&db_uri, 5)).unwrap();

    let driver = format!("{}@example.com", Uuid::new_v4());
    let ride = test_ride(&driver, 2);
    block_on(store.insert_ride(&ride)).unwrap();

    let pickup = ride.passengers[0].pickup.clone();
    let first = Passenger::rider(Uuid::new_v4(), test_member("a@example.com"), pickup.clone());
    let second = Passenger::rider(Uuid::new_v4(), test_member("b@example.com"), pickup);

    let updated = block_on(store.push_passenger(ride.id, &driver, &first))
        .unwrap()
        .unwrap();
    assert_eq!(updated.passengers.len(), 2);

    assert!(block_on(store.push_passenger(ride.id, &driver, &second))
        .unwrap()
        .is_none());

    block_on(store.delete_active_ride(&driver)).unwrap();
}
