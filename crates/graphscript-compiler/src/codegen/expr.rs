//! Expression code generation.
//!
//! Every non-trivial expression is materialized into a uniquely named
//! `const` temporary so any value a later statement needs has a name.
//! Generation returns the operand text to use for the node: the temporary's
//! name, a variable name, or a parenthesized literal.

use crate::codegen::idents::{CALL_CTX, OUT_VALS};
use crate::codegen::{
    call_text, num_literal, pop_call_stack, push_call_stack, str_literal, tmp_name, var_name,
    Emitter,
};
use crate::error::{CompileError, Result};
use crate::node::{Node, NodeCollection, NodeId};
use crate::option::CompileOption;

/// Generate code for the expression `id`, returning its operand text.
pub(crate) fn gen_expr(
    em: &mut Emitter,
    nodes: &NodeCollection,
    id: NodeId,
    opt: &CompileOption,
) -> Result<String> {
    match nodes.node(id)? {
        Node::NumLiteral(v) => Ok(format!("({})", num_literal(*v))),
        Node::StrLiteral(s) => Ok(format!("({})", str_literal(s))),
        Node::BoolLiteral(b) => Ok(format!("({})", b)),
        Node::ListLiteral => Ok("([])".to_string()),

        Node::VarRef { decl } => {
            let decl = nodes.resolve_var_decl(*decl)?;
            Ok(var_name(decl))
        }

        Node::BinaryExpr { op, left, right } => {
            let op = *op;
            let (left, right) = (*left, *right);
            let left_text = gen_expr(em, nodes, left, opt)?;
            let right_text = gen_expr(em, nodes, right, opt)?;
            let result = tmp_name(id);
            let raw_expr = format!("({} {} {})", left_text, op.token(), right_text);
            if opt.preserve_float_semantics && op.may_produce_non_finite() {
                // Non-finite results fall back to the left operand.
                let raw = format!("{}r", result);
                em.line(&format!("const {} = {};", raw, raw_expr));
                em.line(&format!(
                    "const {} = (Number.isFinite({})) ? {} : {};",
                    result, raw, raw, left_text
                ));
            } else {
                em.line(&format!("const {} = {};", result, raw_expr));
            }
            Ok(result)
        }

        Node::UnaryExpr { op, operand } => {
            let op = *op;
            let operand = *operand;
            let operand_text = gen_expr(em, nodes, operand, opt)?;
            let result = tmp_name(id);
            em.line(&format!("const {} = ({}{});", result, op.token(), operand_text));
            Ok(result)
        }

        Node::BuiltinCall {
            func,
            args,
            out_args,
        } => {
            let func = *func;
            let (args, out_args) = (args.clone(), out_args.clone());
            if func.is_identity() {
                // Identity forwards its first argument; no call is emitted.
                let first = args
                    .first()
                    .copied()
                    .ok_or(CompileError::MisplacedNode {
                        id,
                        context: "an identity call with no argument",
                    })?;
                return gen_expr(em, nodes, first, opt);
            }
            gen_call(em, nodes, id, func.runtime_name(), &args, &out_args, opt)
        }

        Node::UserFuncCall {
            def,
            args,
            out_args,
        } => {
            let def = *def;
            let (args, out_args) = (args.clone(), out_args.clone());
            let callee = match nodes.node(def)? {
                Node::FuncDef { .. } => crate::codegen::func_name(def),
                _ => {
                    return Err(CompileError::MisplacedNode {
                        id: def,
                        context: "the callee of a function call",
                    })
                }
            };
            gen_call(em, nodes, id, &callee, &args, &out_args, opt)
        }

        Node::ListToText { list, label } => {
            let list = *list;
            let label = label.clone();
            let decl = nodes.resolve_var_decl(list)?;
            let args = [var_name(decl), str_literal(&label)];
            push_call_stack(em, id, opt);
            let result = tmp_name(id);
            em.line(&format!(
                "const {} = {};",
                result,
                call_text("_listToStr", &args)
            ));
            pop_call_stack(em, opt);
            Ok(result)
        }

        _ => Err(CompileError::MisplacedNode {
            id,
            context: "an expression",
        }),
    }
}

/// Generate a call with out-argument copy-back.
///
/// Out-arguments are passed as ordinary arguments after the regular ones;
/// after the call their values are copied back out of the call context's
/// shared out-values slot, in parameter order.
fn gen_call(
    em: &mut Emitter,
    nodes: &NodeCollection,
    site: NodeId,
    callee: &str,
    args: &[NodeId],
    out_args: &[NodeId],
    opt: &CompileOption,
) -> Result<String> {
    let mut texts = Vec::with_capacity(args.len() + out_args.len());
    for arg in args {
        texts.push(gen_expr(em, nodes, *arg, opt)?);
    }
    let mut out_decls = Vec::with_capacity(out_args.len());
    for out in out_args {
        let decl = nodes.resolve_var_decl(*out)?;
        texts.push(var_name(decl));
        out_decls.push(decl);
    }

    push_call_stack(em, site, opt);
    let result = tmp_name(site);
    em.line(&format!("const {} = {};", result, call_text(callee, &texts)));
    pop_call_stack(em, opt);

    for (i, decl) in out_decls.iter().enumerate() {
        em.line(&format!(
            "{} = {}.{}[{}];",
            var_name(*decl),
            CALL_CTX,
            OUT_VALS,
            i
        ));
    }
    Ok(result)
}
