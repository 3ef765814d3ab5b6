//! Fmt command - rewrites a document in canonical compact PlainLson.

use std::{
    fs::File,
    io::{BufWriter, Write},
};

use livetree::plain_lson;
use tracing::info;

use super::CommandResult;
use crate::{cli::FmtArgs, document::load_tree};

/// Run the fmt command. Writes to `--output` when given, otherwise to `out`.
pub fn run(args: &FmtArgs, out: &mut impl Write) -> CommandResult {
    let tree = load_tree(&args.input)?;
    match &args.output {
        Some(path) => {
            let mut file = BufWriter::new(File::create(path)?);
            write_document(&tree, args.lazy, &mut file)?;
            file.flush()?;
            info!(output = %path.display(), "wrote document");
        }
        None => write_document(&tree, args.lazy, out)?,
    }
    Ok(())
}

fn write_document(tree: &livetree::NodeTree, lazy: bool, out: &mut impl Write) -> CommandResult {
    if lazy {
        for fragment in plain_lson::encode_lazy(tree) {
            out.write_all(fragment.as_bytes())?;
        }
    } else {
        out.write_all(plain_lson::encode_to_string(tree).as_bytes())?;
    }
    writeln!(out)?;
    Ok(())
}
