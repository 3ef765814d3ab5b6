//! Check command - validates a document and summarizes its nodes.

use std::{collections::BTreeMap, io::Write};

use livetree::{NodeTree, constants::ROOT_ID};

use super::CommandResult;
use crate::{
    cli::InputArgs,
    document::load_tree,
    output::{OutputFormat, write_table},
};

/// Node counts per kind and the deepest nesting level.
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub kinds: BTreeMap<&'static str, usize>,
    pub depth: usize,
}

pub fn summarize(tree: &NodeTree) -> Summary {
    let mut summary = Summary::default();
    for node in tree.subtree(ROOT_ID) {
        *summary.kinds.entry(node.kind().as_str()).or_default() += 1;
        summary.depth = summary.depth.max(tree.ancestors(node.id.as_str()).count());
    }
    summary
}

/// Run the check command
pub fn run(args: &InputArgs, format: OutputFormat, out: &mut impl Write) -> CommandResult {
    let tree = load_tree(args)?;
    let summary = summarize(&tree);
    match format {
        OutputFormat::Human => {
            writeln!(out, "ok: {} nodes, depth {}", tree.node_count(), summary.depth)?;
            let rows: Vec<Vec<String>> = summary
                .kinds
                .iter()
                .map(|(kind, count)| vec![kind.to_string(), count.to_string()])
                .collect();
            write_table(out, &["KIND", "COUNT"], &rows)?;
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "nodes": tree.node_count(),
                "depth": summary.depth,
                "kinds": summary.kinds,
            });
            writeln!(out, "{}", serde_json::to_string(&value)?)?;
        }
    }
    Ok(())
}
