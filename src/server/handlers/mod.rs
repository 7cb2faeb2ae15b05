pub mod places;
pub mod requests;
pub mod rides;

pub async fn alive() -> &'static str {
    "carpool is up"
}
