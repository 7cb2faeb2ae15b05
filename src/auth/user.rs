use oso::PolarClass;
use serde::{Deserialize, Serialize};

use crate::entities::Member;

/// Verified caller identity, threaded explicitly into every engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub phone: String,
    pub name: String,
}

impl User {
    pub fn new(email: impl Into<String>, phone: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            phone: phone.into(),
            name: name.into(),
        }
    }

    pub fn member(&self) -> Member {
        Member {
            email: self.email.clone(),
            phone: self.phone.clone(),
            name: self.name.clone(),
        }
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("email", |recv: &User| recv.email.clone())
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}
