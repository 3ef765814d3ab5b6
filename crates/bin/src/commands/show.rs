//! Immutable command - prints the plain JSON view of a document.

use std::io::Write;

use livetree::plain_lson;

use super::CommandResult;
use crate::{cli::InputArgs, document::load_tree, output::OutputFormat};

/// Run the immutable command. Human output is pretty-printed.
pub fn run(args: &InputArgs, format: OutputFormat, out: &mut impl Write) -> CommandResult {
    let tree = load_tree(args)?;
    let value = plain_lson::to_immutable(&tree);
    let text = match format {
        OutputFormat::Human => serde_json::to_string_pretty(&value)?,
        OutputFormat::Json => serde_json::to_string(&value)?,
    };
    writeln!(out, "{text}")?;
    Ok(())
}
