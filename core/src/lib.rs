pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod model;
pub mod negotiate;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
