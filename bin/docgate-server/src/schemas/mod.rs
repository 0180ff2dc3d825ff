//! Request / response bodies shared by the HTTP routes and the OpenAPI document.

pub mod convert;
pub mod error;
pub mod health;

pub use error::ErrorBody;
