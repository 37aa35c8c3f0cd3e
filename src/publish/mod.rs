//! Publishing a validated capture to X.

pub mod oauth;
pub mod twitter;

pub use twitter::{TwitterPublisher, publish_latest};
