pub mod ai_utils;
pub mod analysis;
pub mod analytics;
pub mod api;
pub mod certificate;
pub mod config;
pub mod course;
pub mod error;
pub mod progress;
pub mod quiz;
pub mod server;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
