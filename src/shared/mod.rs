pub mod config;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod settings;
