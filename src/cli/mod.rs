//! Command-line interface definitions.
//!
//! - `Cli`, `Commands`: argument definitions via clap
//! - `Display`: formatted terminal output

mod commands;
mod display;

pub use commands::{
    Cli, Commands, ConfigAction, InfringementArgs, OutputFormat, PenaltyAction, SessionAction,
};
pub use display::Display;
