//! # banshare-cli
//!
//! Command-line front end for a banshare agent.
//!
//! ## Commands
//!
//! - **sync**: one synchronization cycle, or a loop with `--watch`
//! - **status** / **list**: inspect the registry's lists
//! - **release**: manually allow a blocked IP
//! - **config**: show, locate or create the agent configuration file

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
