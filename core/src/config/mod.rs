mod document;
mod load;
mod location;
mod types;

pub use document::*;
pub use load::{load_app_config, DEFAULT_CONFIG_PATH, LOCAL_CONFIG_PATH};
pub use location::{infer_config_base, local_path, read_location, NodeInputs, CLUSTER_COMPLETED_SPEC};
pub use types::*;
