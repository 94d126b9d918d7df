pub mod shutdown;
pub mod startup;

pub use startup::{AppServices, StartupContext, prepare_server_startup};
