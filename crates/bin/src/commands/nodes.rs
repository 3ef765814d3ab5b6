//! Nodes command - prints the storage node snapshot of a document.

use std::io::Write;

use livetree::node::SerializedNode;

use super::CommandResult;
use crate::{
    cli::InputArgs,
    document::load_tree,
    output::{OutputFormat, write_table},
};

/// Run the nodes command
pub fn run(args: &InputArgs, format: OutputFormat, out: &mut impl Write) -> CommandResult {
    let nodes = load_tree(args)?.serialize();
    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = nodes.iter().map(row).collect();
            write_table(out, &["ID", "TYPE", "PARENT", "KEY", "DATA"], &rows)?;
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&nodes)?)?,
    }
    Ok(())
}

fn row(SerializedNode(id, crdt): &SerializedNode) -> Vec<String> {
    vec![
        id.to_string(),
        crdt.kind.to_string(),
        crdt.parent_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        crdt.parent_key.clone().unwrap_or_default(),
        crdt.data.as_ref().map(ToString::to_string).unwrap_or_default(),
    ]
}
