//! CLI command handlers: build the shared configuration, pick the install
//! root and print results.

pub mod config;
mod install;
mod list;
pub mod paths;
mod tree;
mod uninstall;

pub use config::{Config, ConfigOverrides};
pub use install::install;
pub use list::list;
pub use tree::tree;
pub use uninstall::uninstall;
