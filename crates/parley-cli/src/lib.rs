//! `parley` terminal client: wires the voice pipeline to stdin/stdout.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Dependencies used by the binary entry point
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod error;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{Session, bootstrap};
pub use error::CliError;
pub use parser::Cli;
