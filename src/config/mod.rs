//! Configuration module for tributary.
//!
//! Handles the config file, environment variables, and settings.

mod settings;

pub use settings::{
    expand_env_vars, ClientSettings, PathSettings, ServerSettings, Settings, SettingsError,
};
