//! User-defined function code generation.
//!
//! Every function body lives inside one `_end:` labeled block so `return`
//! statements compile to a labeled break and the out-parameter copy into
//! the call context runs uniformly before every exit.

use crate::codegen::idents::{CALL_CTX, END_LABEL, OUT_VALS};
use crate::codegen::stmt::gen_stmts;
use crate::codegen::{func_name, name_comment, var_name, Emitter};
use crate::error::Result;
use crate::node::{Node, NodeCollection, NodeId};
use crate::option::CompileOption;

/// Emit every function definition registered as a compile target.
pub(crate) fn gen_func_defs(
    em: &mut Emitter,
    nodes: &NodeCollection,
    opt: &CompileOption,
) -> Result<()> {
    for id in nodes.root_nodes().to_vec() {
        if let Node::FuncDef {
            name,
            params,
            out_params,
            body,
        } = nodes.node(id)?
        {
            let name = name.clone();
            let (params, out_params, body) = (params.clone(), out_params.clone(), body.clone());
            gen_func_def(em, nodes, id, &name, &params, &out_params, &body, opt)?;
            em.blank();
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn gen_func_def(
    em: &mut Emitter,
    nodes: &NodeCollection,
    id: NodeId,
    name: &str,
    params: &[NodeId],
    out_params: &[NodeId],
    body: &[NodeId],
    opt: &CompileOption,
) -> Result<()> {
    let mut param_names = vec![CALL_CTX.to_string()];
    for param in params.iter().chain(out_params) {
        param_names.push(var_name(*param));
    }
    em.line(&format!(
        "function {}({}) {{{}",
        func_name(id),
        param_names.join(", "),
        name_comment(name, opt)
    ));
    em.indent();
    em.line(&format!("{}: {{", END_LABEL));
    em.indent();
    gen_stmts(em, nodes, body, opt)?;
    em.dedent();
    em.line("}");
    if !out_params.is_empty() {
        let outs: Vec<String> = out_params.iter().map(|p| var_name(*p)).collect();
        em.line(&format!(
            "{}.{} = [{}];",
            CALL_CTX,
            OUT_VALS,
            outs.join(", ")
        ));
    }
    em.dedent();
    em.line("}");
    Ok(())
}
