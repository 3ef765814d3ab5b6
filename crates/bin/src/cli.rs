//! CLI argument definitions for the livetree binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    /// Aligned text for terminals
    #[default]
    Human,
    /// One JSON value per result
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
        }
    }
}

/// Inspect, convert and replay livetree documents
#[derive(Parser, Debug)]
#[command(name = "livetree")]
#[command(about = "Livetree: inspect and convert PlainLson documents")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "human", env = "LIVETREE_FORMAT")]
    pub format: Format,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a PlainLson document and summarize its nodes
    Check(InputArgs),
    /// Re-encode a PlainLson document in canonical compact form
    Fmt(FmtArgs),
    /// Print the plain JSON view of a document, without container tags
    Immutable(InputArgs),
    /// Print the document as a storage node snapshot
    Nodes(InputArgs),
    /// Apply a log of ops to a document and print the result
    Replay(ReplayArgs),
}

/// Where the document comes from
#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// PlainLson file, or `-` for stdin
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Actor number used for the ids of decoded nodes
    #[arg(long, default_value_t = 0, env = "LIVETREE_ACTOR")]
    pub actor: u32,
}

/// Arguments for the fmt command
#[derive(clap::Args, Debug)]
pub struct FmtArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stream the output in small fragments instead of building it in memory
    #[arg(long, env = "LIVETREE_LAZY")]
    pub lazy: bool,
}

/// Arguments for the replay command
#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// JSON array of ops in server order
    #[arg(long)]
    pub ops: PathBuf,
}
