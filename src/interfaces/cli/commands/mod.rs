//! CLI command implementations

mod config_gen;
mod site;
mod sweep;

pub use config_gen::config_generate;
pub use site::{add_site, list_sites};
pub use sweep::run_sweep;
