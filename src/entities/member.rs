use serde::{Deserialize, Serialize};

/// Identity snapshot of a driver or rider as stored on rides and requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
    pub phone: String,
    pub name: String,
}
