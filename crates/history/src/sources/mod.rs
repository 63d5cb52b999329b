//! Bundled historical data sources.

pub mod rest;
pub mod synthetic;

pub use rest::RestSource;
pub use synthetic::SyntheticSource;
