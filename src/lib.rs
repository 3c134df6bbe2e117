pub mod args;
pub mod backup;
pub mod commands;
mod config;
mod error;
mod fs;
pub mod model;
pub mod store;

#[cfg(test)]
mod test;

pub use config::Config;
pub use error::{Error, ErrorType, Result};
