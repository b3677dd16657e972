pub mod builder;
pub mod strategy;

pub use builder::*;
pub use strategy::*;
