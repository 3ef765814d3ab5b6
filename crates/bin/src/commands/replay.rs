//! Replay command - applies an op log to a document, as the server would.

use std::io::Write;

use livetree::{plain_lson, resolver};
use tracing::{info, warn};

use super::CommandResult;
use crate::{
    cli::ReplayArgs,
    document::{load_ops, load_tree},
    output::OutputFormat,
};

/// Run the replay command. Rejected ops are reported and skipped.
pub fn run(args: &ReplayArgs, format: OutputFormat, out: &mut impl Write) -> CommandResult {
    let mut tree = load_tree(&args.input)?;
    let ops = load_ops(&args.ops)?;
    let mut rejected = 0;
    for (index, op) in ops.iter().enumerate() {
        if let Err(error) = resolver::apply_op(&mut tree, &op.kind) {
            warn!(index, op = op.kind.name(), %error, "skipping rejected op");
            rejected += 1;
        }
    }
    info!(applied = ops.len() - rejected, rejected, "replayed ops");

    let doc = plain_lson::encode(&tree);
    match format {
        OutputFormat::Human => writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&doc)?)?,
    }
    Ok(())
}
