//! System-level modules
//!
//! Logging setup shared by the server and the CLI.

pub mod logging;

pub use logging::init_logging;
