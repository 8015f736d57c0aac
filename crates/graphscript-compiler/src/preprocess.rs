//! Pre-compile graph normalization.
//!
//! Runs once before code generation. The only normalization today is
//! filling list-to-text labels from the referenced variable's declared
//! name, so the generated display call carries the name the user sees in
//! the editor. The pass is idempotent.

use crate::error::{CompileError, Result};
use crate::node::{InitValue, Node, NodeCollection, NodeId};

/// Normalize the collection in place.
pub fn preprocess(nodes: &mut NodeCollection) -> Result<()> {
    let targets: Vec<NodeId> = nodes
        .ids()
        .filter(|id| matches!(nodes.node(*id), Ok(Node::ListToText { .. })))
        .collect();

    for id in targets {
        let list = match nodes.node(id)? {
            Node::ListToText { list, .. } => *list,
            _ => unreachable!("filtered above"),
        };
        let decl = nodes.resolve_var_decl(list)?;
        let name = match nodes.node(decl)? {
            Node::VarDecl {
                name,
                init: InitValue::List,
                ..
            } => name.clone(),
            _ => return Err(CompileError::NotAList(list)),
        };
        if let Node::ListToText { label, .. } = nodes.node_mut(id)? {
            *label = name;
        }
    }
    Ok(())
}
