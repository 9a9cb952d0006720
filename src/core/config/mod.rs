pub mod data;
pub mod io;
pub mod store;

pub use data::{Config, ConfigPatch, GRAPHQL_ENDPOINT};
pub use store::{ConfigStore, EnvOverrides};
