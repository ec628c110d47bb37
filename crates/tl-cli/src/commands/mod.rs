//! CLI subcommand implementations.

pub mod delete;
pub mod items;
pub mod last_update;
pub mod put;
pub mod resync;
pub mod status;
pub mod timeline;
mod util;
