//! CLI command implementations

mod config;
mod info;
mod list;

pub use config::{ConfigArgs, config};
pub use info::{InfoArgs, info};
pub use list::{ListArgs, list};
