pub mod retry;

pub use retry::{ExponentialBackoffPlugin, FixedRetryPlugin, LinearRetryPlugin};
