#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod error;
pub mod logging;

pub use error::{ErrorKind, GatewayError, GatewayResult};
