//! `tracing-subscriber` setup shared by the TokenCraft binaries.
mod logging;

pub use logging::{init, LogConfig, LogFormat, LogOutput};
