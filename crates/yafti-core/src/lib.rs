pub mod catalog;
pub mod config;
pub mod error;
pub mod paths;
pub mod selection;

pub use error::{Result, YaftiError};
