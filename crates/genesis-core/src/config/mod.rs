//! Genesis unified configuration layer.
//!
//! All environment reads live here; engine code consumes structured config
//! instead of calling `std::env::var` directly.
//!
//! - `loader`: env_or, env_optional, env_bool, env_parse helpers
//! - `schema`: EvolutionConfig, CycleIntervals, ObservabilityConfig, PathsConfig
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_parse, load_dotenv, load_dotenv_from_dir};
pub use schema::{
    CycleIntervals, EvolutionConfig, EvolutionMode, ObservabilityConfig, PathsConfig,
    DEFAULT_LOG_LEVEL,
};
