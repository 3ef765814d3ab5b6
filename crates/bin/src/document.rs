//! Loading documents and op logs from files or stdin.

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use livetree::{Json, NodeTree, Op, clock::IdClock, plain_lson};
use tracing::debug;

use crate::cli::InputArgs;

type Error = Box<dyn std::error::Error>;

/// Reads `path`, or stdin when it is `-`.
pub fn read_input(path: &Path) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    fs::read_to_string(path)
}

/// Parses and decodes a PlainLson document into a tree.
pub fn load_tree(args: &InputArgs) -> Result<NodeTree, Error> {
    let text = read_input(&args.input)?;
    let tree = parse_tree(&text, args.actor)?;
    debug!(input = %args.input.display(), nodes = tree.node_count(), "loaded document");
    Ok(tree)
}

/// Decodes PlainLson text, assigning node ids for `actor`.
pub fn parse_tree(text: &str, actor: u32) -> Result<NodeTree, Error> {
    let doc: Json = serde_json::from_str(text).map_err(plain_lson::DecodeError::from)?;
    Ok(plain_lson::decode_tree(&doc, &mut IdClock::new(actor))?)
}

/// Reads a JSON array of ops.
pub fn load_ops(path: &Path) -> Result<Vec<Op>, Error> {
    let text = read_input(path)?;
    Ok(serde_json::from_str(&text)?)
}
