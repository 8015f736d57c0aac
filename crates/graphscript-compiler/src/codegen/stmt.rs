//! Statement code generation.

use crate::codegen::decl::gen_var_decl;
use crate::codegen::expr::gen_expr;
use crate::codegen::idents::{END_LABEL, LOCK, UNLOCK};
use crate::codegen::{lock_name, tmp_name, var_name, Emitter};
use crate::error::{CompileError, Result};
use crate::node::{Node, NodeCollection, NodeId};
use crate::option::CompileOption;

/// Generate code for a statement list.
pub(crate) fn gen_stmts(
    em: &mut Emitter,
    nodes: &NodeCollection,
    ids: &[NodeId],
    opt: &CompileOption,
) -> Result<()> {
    for id in ids {
        gen_stmt(em, nodes, *id, opt)?;
    }
    Ok(())
}

/// Generate code for one statement. Expression nodes are allowed here;
/// their result is discarded.
pub(crate) fn gen_stmt(
    em: &mut Emitter,
    nodes: &NodeCollection,
    id: NodeId,
    opt: &CompileOption,
) -> Result<()> {
    match nodes.node(id)? {
        Node::Assign { target, value, add } => {
            let (target, value, add) = (*target, *value, *add);
            let decl = nodes
                .resolve_var_decl(target)
                .map_err(|_| CompileError::NotAVariable(target))?;
            let value_text = gen_expr(em, nodes, value, opt)?;
            let target_name = var_name(decl);
            if add {
                em.line(&format!(
                    "{} = {} + {};",
                    target_name, target_name, value_text
                ));
            } else {
                em.line(&format!("{} = {};", target_name, value_text));
            }
            Ok(())
        }

        Node::If {
            cond,
            then_body,
            else_body,
        } => {
            let cond = *cond;
            let (then_body, else_body) = (then_body.clone(), else_body.clone());
            let cond_text = gen_expr(em, nodes, cond, opt)?;
            em.line(&format!("if ({}) {{", cond_text));
            em.indent();
            gen_stmts(em, nodes, &then_body, opt)?;
            em.dedent();
            if let Some(else_body) = else_body {
                em.line("} else {");
                em.indent();
                gen_stmts(em, nodes, &else_body, opt)?;
                em.dedent();
            }
            em.line("}");
            Ok(())
        }

        // The condition must be re-evaluated each iteration, and evaluating
        // it can take several statements, so the loop head is unconditional
        // and the condition exits from inside.
        Node::While { cond, body } => {
            let cond = *cond;
            let body = body.clone();
            em.line("while (true) {");
            em.indent();
            let cond_text = gen_expr(em, nodes, cond, opt)?;
            em.line(&format!("if (!{}) {{ break; }}", cond_text));
            gen_stmts(em, nodes, &body, opt)?;
            em.dedent();
            em.line("}");
            Ok(())
        }

        Node::Repeat { count, body } => {
            let count = *count;
            let body = body.clone();
            let count_text = gen_expr(em, nodes, count, opt)?;
            let limit = format!("{}c", tmp_name(id));
            let index = format!("{}i", tmp_name(id));
            em.line(&format!("const {} = Math.floor({});", limit, count_text));
            em.line(&format!(
                "for (let {} = 0; {} < {}; ++{}) {{",
                index, index, limit, index
            ));
            em.indent();
            gen_stmts(em, nodes, &body, opt)?;
            em.dedent();
            em.line("}");
            Ok(())
        }

        Node::Compound { locals, body } => {
            let (locals, body) = (locals.clone(), body.clone());
            em.line("{");
            em.indent();
            for local in &locals {
                gen_var_decl(em, nodes, *local, opt)?;
            }
            gen_stmts(em, nodes, &body, opt)?;
            em.dedent();
            em.line("}");
            Ok(())
        }

        Node::Break => {
            em.line("break;");
            Ok(())
        }

        Node::Continue => {
            em.line("continue;");
            Ok(())
        }

        Node::Return => {
            em.line(&format!("break {};", END_LABEL));
            Ok(())
        }

        Node::CriticalSection { lock, body } => {
            let lock = *lock;
            let body = body.clone();
            let lock_var = match nodes.node(lock)? {
                Node::SyncDecl { .. } => lock_name(lock),
                _ => {
                    return Err(CompileError::MisplacedNode {
                        id: lock,
                        context: "the lock of a critical section",
                    })
                }
            };
            em.line("try {");
            em.indent();
            em.line(&format!("{}({});", LOCK, lock_var));
            gen_stmts(em, nodes, &body, opt)?;
            em.dedent();
            em.line("} finally {");
            em.indent();
            em.line(&format!("{}({});", UNLOCK, lock_var));
            em.dedent();
            em.line("}");
            Ok(())
        }

        Node::VarDecl { .. } => gen_var_decl(em, nodes, id, opt),

        // Expression in statement position: emit it, drop the result.
        Node::NumLiteral(_)
        | Node::StrLiteral(_)
        | Node::BoolLiteral(_)
        | Node::ListLiteral
        | Node::VarRef { .. }
        | Node::BinaryExpr { .. }
        | Node::UnaryExpr { .. }
        | Node::BuiltinCall { .. }
        | Node::UserFuncCall { .. }
        | Node::ListToText { .. } => {
            gen_expr(em, nodes, id, opt)?;
            Ok(())
        }

        Node::SyncDecl { .. } | Node::FuncDef { .. } | Node::EventHandler { .. } => {
            Err(CompileError::MisplacedNode {
                id,
                context: "a statement",
            })
        }
    }
}
