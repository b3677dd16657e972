mod local;

pub use local::LocalHost;
