//! Declaration code generation: variables and shared sync resources.

use crate::codegen::idents::{GEN_BARRIER, GEN_LOCK_OBJ};
use crate::codegen::{lock_name, name_comment, num_literal, str_literal, var_name, Emitter};
use crate::error::{CompileError, Result};
use crate::node::{InitValue, Node, NodeCollection, NodeId, SyncKind};
use crate::option::CompileOption;

/// Emit one variable declaration.
pub(crate) fn gen_var_decl(
    em: &mut Emitter,
    nodes: &NodeCollection,
    id: NodeId,
    opt: &CompileOption,
) -> Result<()> {
    let (name, init) = match nodes.node(id)? {
        Node::VarDecl { name, init, .. } => (name.clone(), init.clone()),
        _ => {
            return Err(CompileError::MisplacedNode {
                id,
                context: "a variable declaration",
            })
        }
    };
    em.line(&format!(
        "let {} = {};{}",
        var_name(id),
        init_text(&init),
        name_comment(&name, opt)
    ));
    Ok(())
}

fn init_text(init: &InitValue) -> String {
    match init {
        InitValue::Num(v) => num_literal(*v),
        InitValue::Str(s) => str_literal(s),
        InitValue::Bool(b) => b.to_string(),
        InitValue::List => "[]".to_string(),
    }
}

/// Emit the top-level variable and sync-resource declarations, in root
/// registration order.
pub(crate) fn gen_global_decls(
    em: &mut Emitter,
    nodes: &NodeCollection,
    opt: &CompileOption,
) -> Result<()> {
    for id in nodes.root_nodes().to_vec() {
        match nodes.node(id)? {
            Node::VarDecl { .. } => gen_var_decl(em, nodes, id, opt)?,
            Node::SyncDecl { name, kind } => {
                let (name, kind) = (name.clone(), *kind);
                let ctor = match kind {
                    SyncKind::Lock => format!("{}()", GEN_LOCK_OBJ),
                    SyncKind::Barrier(parties) => format!("{}({})", GEN_BARRIER, parties),
                };
                em.line(&format!(
                    "let {} = {};{}",
                    lock_name(id),
                    ctor,
                    name_comment(&name, opt)
                ));
            }
            _ => {}
        }
    }
    Ok(())
}
