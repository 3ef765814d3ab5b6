//! Subcommand implementations. Each writes its result to the given writer.

pub mod check;
pub mod fmt;
pub mod nodes;
pub mod replay;
pub mod show;

type CommandResult = Result<(), Box<dyn std::error::Error>>;
