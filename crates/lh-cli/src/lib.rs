//! Listening history CLI library.
//!
//! This crate provides the CLI interface for the listening history engine.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
