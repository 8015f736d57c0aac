//! Event handler and entry routine code generation.
//!
//! Each handler is a parameterless function guarded by its own lock: the
//! body only runs when the lock is free, so a firing that arrives while the
//! previous one is still running is dropped rather than queued. The guard
//! is released in a `finally` on every exit path.

use crate::codegen::idents::{
    ADD_EVENT, CALL_CTX, END_LABEL, MAIN_FUNC, MAIN_LOCK, NEW_CALL_CTX, SLEEP, TRACE_EXCEPTION,
    TRY_LOCK, UNLOCK,
};
use crate::codegen::stmt::{gen_stmt, gen_stmts};
use crate::codegen::{func_name, lock_name, num_literal, Emitter};
use crate::error::Result;
use crate::node::{EventTrigger, Node, NodeCollection, NodeId};
use crate::option::CompileOption;

/// Emit every event handler registered as a compile target.
pub(crate) fn gen_event_handlers(
    em: &mut Emitter,
    nodes: &NodeCollection,
    opt: &CompileOption,
) -> Result<()> {
    for id in nodes.root_nodes().to_vec() {
        if let Node::EventHandler { trigger, body } = nodes.node(id)? {
            let trigger = *trigger;
            let body = body.clone();
            gen_event_handler(em, nodes, id, trigger, &body, opt)?;
            em.blank();
        }
    }
    Ok(())
}

fn gen_event_handler(
    em: &mut Emitter,
    nodes: &NodeCollection,
    id: NodeId,
    trigger: EventTrigger,
    body: &[NodeId],
    opt: &CompileOption,
) -> Result<()> {
    let fn_name = func_name(id);
    let lock_var = lock_name(id);
    gen_guarded_fn(em, &fn_name, &lock_var, opt, &mut |em| {
        if let EventTrigger::DelayedStart { seconds } = trigger {
            em.line(&format!(
                "{}({}, {});",
                SLEEP,
                CALL_CTX,
                num_literal(seconds)
            ));
        }
        gen_stmts(em, nodes, body, opt)
    })?;
    em.line(&format!(
        "{}({}, '{}');",
        ADD_EVENT,
        fn_name,
        trigger.event_name().as_code()
    ));
    Ok(())
}

/// Emit the entry routine, if the collection has an entry point. It uses
/// the same guard shape as an event handler and runs at program start.
pub(crate) fn gen_entry_routine(
    em: &mut Emitter,
    nodes: &NodeCollection,
    opt: &CompileOption,
) -> Result<()> {
    let Some(entry) = nodes.entry_point() else {
        return Ok(());
    };
    gen_guarded_fn(em, MAIN_FUNC, MAIN_LOCK, opt, &mut |em| {
        gen_stmt(em, nodes, entry, opt)
    })?;
    em.line(&format!(
        "{}({}, '{}');",
        ADD_EVENT,
        MAIN_FUNC,
        graphscript_contracts::EventName::ProgramStart.as_code()
    ));
    Ok(())
}

/// Emit a lock declaration plus a parameterless function whose body runs
/// under that lock's guard.
fn gen_guarded_fn(
    em: &mut Emitter,
    fn_name: &str,
    lock_var: &str,
    opt: &CompileOption,
    gen_body: &mut dyn FnMut(&mut Emitter) -> Result<()>,
) -> Result<()> {
    em.line(&format!(
        "let {} = {}();",
        lock_var,
        crate::codegen::idents::GEN_LOCK_OBJ
    ));
    em.line(&format!("function {}() {{", fn_name));
    em.indent();
    em.line(&format!("if ({}({})) {{", TRY_LOCK, lock_var));
    em.indent();
    em.line(&format!("const {} = {}();", CALL_CTX, NEW_CALL_CTX));
    em.line("try {");
    em.indent();
    em.line(&format!("{}: {{", END_LABEL));
    em.indent();
    gen_body(em)?;
    em.dedent();
    em.line("}");
    em.dedent();
    if opt.exception_tracing {
        em.line("} catch (_e) {");
        em.indent();
        em.line(&format!("{}({}, _e);", TRACE_EXCEPTION, CALL_CTX));
        em.line("throw _e;");
        em.dedent();
    }
    em.line("} finally {");
    em.indent();
    em.line(&format!("{}({});", UNLOCK, lock_var));
    em.dedent();
    em.line("}");
    em.dedent();
    em.line("}");
    em.dedent();
    em.line("}");
    Ok(())
}
