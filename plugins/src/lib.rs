pub mod assets;
pub mod builders;
pub mod executor;
pub mod factory;
pub mod host;
pub mod kernel;
pub mod nodetasks;
pub mod stores;
