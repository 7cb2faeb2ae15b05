pub mod authorizor;
mod gate;
mod user;

pub use gate::{
    DynIdentityGate, ForwardedIdentityGate, IdentityGate, EMAIL_HEADER, NAME_HEADER, PHONE_HEADER,
};
pub use user::User;
