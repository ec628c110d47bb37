//! Timelines CLI library.
//!
//! This crate provides the CLI interface for the timeline engine.

mod app;
mod cli;
pub mod commands;
mod config;

pub use app::App;
pub use cli::{Cli, Commands};
pub use config::Config;
