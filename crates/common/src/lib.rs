//! Shared types for the academy bot workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, parse_secret_list};
