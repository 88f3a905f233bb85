//! Ambient configuration and logging shared by the event stream client binaries.

pub mod config;
pub mod logging;

pub use config::Config;
pub use logging::Logger;
