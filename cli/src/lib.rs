//! nodeup-cli library: the node-up command, exposed for integration tests.

pub mod app;
pub mod commands;
pub mod logging;
