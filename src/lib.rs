pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod runtime;
pub mod wire;

pub use error::{Error, Result};
