//! Configuration loading for the courier gateway.

mod env_subst;
mod loader;
mod schema;

pub use {
    env_subst::substitute_env,
    loader::{discover_and_load, load_config},
    schema::{
        AuthConfig, ChannelEndpoints, CourierConfig, DatabaseConfig, IngestConfig, OperatorToken,
        ServerConfig,
    },
};
