//! The compiler pipeline.
//!
//! Compilation is a fixed sequence over the whole collection: library
//! prologue, global declarations, function definitions, event handlers,
//! the entry routine, then the start-timer footer. The same collection and
//! options always produce byte-identical output.

use std::path::{Path, PathBuf};

use std::io::Write;

use crate::codegen::decl::gen_global_decls;
use crate::codegen::event::{gen_entry_routine, gen_event_handlers};
use crate::codegen::func::gen_func_defs;
use crate::codegen::idents::START_TIMER;
use crate::codegen::Emitter;
use crate::error::{CompileError, Result};
use crate::node::NodeCollection;
use crate::option::CompileOption;
use crate::preprocess::preprocess;

/// Compiles node collections into script text.
pub struct Compiler {
    common_lib: String,
    local_lib: String,
    remote_lib: String,
}

impl Compiler {
    /// Build a compiler from in-memory library sources.
    pub fn from_sources(
        common: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            common_lib: common.into(),
            local_lib: local.into(),
            remote_lib: remote.into(),
        }
    }

    /// Build a compiler by reading the library files.
    ///
    /// `common` files are concatenated in order; `local` and `remote` are
    /// the target-specific support fragments.
    pub async fn load(common: &[PathBuf], local: &Path, remote: &Path) -> Result<Self> {
        let mut common_lib = String::new();
        for path in common {
            common_lib.push_str(&read_lib(path).await?);
        }
        Ok(Self {
            common_lib,
            local_lib: read_lib(local).await?,
            remote_lib: read_lib(remote).await?,
        })
    }

    /// Generate the program text without writing it anywhere.
    pub fn generate(&self, nodes: &mut NodeCollection, option: &CompileOption) -> Result<String> {
        preprocess(nodes)?;

        let mut em = Emitter::new();
        em.raw(&self.common_lib);
        if option.local_target {
            em.raw(&self.local_lib);
        } else {
            em.raw(&self.remote_lib);
        }
        em.blank();

        gen_global_decls(&mut em, nodes, option)?;
        em.blank();
        gen_func_defs(&mut em, nodes, option)?;
        gen_event_handlers(&mut em, nodes, option)?;
        gen_entry_routine(&mut em, nodes, option)?;
        em.blank();
        em.line(&format!("{}();", START_TIMER));
        Ok(em.into_code())
    }

    /// Generate the program and write it to the option's output path.
    ///
    /// The artifact is written to a temporary file first and moved into
    /// place, so a failed compile never leaves a partial file behind and
    /// a previous artifact survives any failure.
    pub fn compile(&self, nodes: &mut NodeCollection, option: &CompileOption) -> Result<PathBuf> {
        let code = self.generate(nodes, option)?;
        let out = &option.out_file;
        let parent = out.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| CompileError::ArtifactWrite {
            path: out.clone(),
            source,
        })?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|source| CompileError::ArtifactWrite {
                path: out.clone(),
                source,
            })?;
        tmp.write_all(code.as_bytes())
            .map_err(|source| CompileError::ArtifactWrite {
                path: out.clone(),
                source,
            })?;
        tmp.persist(out).map_err(|e| CompileError::ArtifactWrite {
            path: out.clone(),
            source: e.error,
        })?;

        log::info!("wrote program artifact to {}", out.display());
        Ok(out.clone())
    }
}

async fn read_lib(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CompileError::LibraryRead {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::Builtin;
    use crate::node::{BinaryOp, EventTrigger, InitValue, Node, NodeId, SyncKind};

    fn compiler() -> Compiler {
        Compiler::from_sources("// common lib\n", "// local lib\n", "// remote lib\n")
    }

    fn option() -> CompileOption {
        let mut opt = CompileOption::local("/tmp/unused.js");
        opt.debug_instrumentation = false;
        opt
    }

    fn print_literal(nodes: &mut NodeCollection, text: &str) -> NodeId {
        let lit = nodes.add(Node::StrLiteral(text.to_string()));
        nodes.add(Node::BuiltinCall {
            func: Builtin::Print,
            args: vec![lit],
            out_args: vec![],
        })
    }

    #[test]
    fn test_output_is_deterministic() {
        let build = || {
            let mut nodes = NodeCollection::new();
            let call = print_literal(&mut nodes, "hello");
            nodes.set_entry_point(call);
            nodes
        };
        let a = compiler().generate(&mut build(), &option()).unwrap();
        let b = compiler().generate(&mut build(), &option()).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_load_reads_library_files() {
        let dir = tempfile::tempdir().unwrap();
        let common = dir.path().join("common.js");
        let local = dir.path().join("local.js");
        let remote = dir.path().join("remote.js");
        std::fs::write(&common, "// common lib\n").unwrap();
        std::fs::write(&local, "// local lib\n").unwrap();
        std::fs::write(&remote, "// remote lib\n").unwrap();

        let compiler = Compiler::load(&[common], &local, &remote).await.unwrap();
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "x");
        nodes.set_entry_point(call);
        let code = compiler.generate(&mut nodes, &option()).unwrap();
        assert!(code.contains("// common lib"));
        assert!(code.contains("// local lib"));
        assert!(!code.contains("// remote lib"));
    }

    #[tokio::test]
    async fn test_load_missing_library_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.js");
        let result = Compiler::load(&[], &missing, &missing).await;
        assert!(matches!(result, Err(CompileError::LibraryRead { .. })));
    }

    #[test]
    fn test_print_without_instrumentation() {
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "hello");
        nodes.set_entry_point(call);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert_eq!(code.matches("_print(").count(), 1);
        assert!(code.contains("_print(_ctx, ('hello'))"));
        assert!(!code.contains("_pushCallStack"));
        assert!(!code.contains("_popCallStack"));
    }

    #[test]
    fn test_instrumentation_brackets_call_sites() {
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "hi");
        nodes.set_entry_point(call);

        let mut opt = option();
        opt.debug_instrumentation = true;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        let push = code.find("_pushCallStack(_ctx,").unwrap();
        let call_pos = code.find("_print(_ctx,").unwrap();
        let pop = code.find("_popCallStack(_ctx)").unwrap();
        assert!(push < call_pos && call_pos < pop);
        assert!(code.contains(&format!("'{}'", call.hex())));
    }

    #[test]
    fn test_distinct_nodes_get_distinct_names() {
        let mut nodes = NodeCollection::new();
        let a = nodes.add_root(Node::VarDecl {
            name: "x".to_string(),
            init: InitValue::Num(0.0),
            out_param: false,
        });
        let b = nodes.add_root(Node::VarDecl {
            name: "x".to_string(),
            init: InitValue::Num(0.0),
            out_param: false,
        });

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains(&format!("let _v{} = 0;", a.hex())));
        assert!(code.contains(&format!("let _v{} = 0;", b.hex())));
        assert_ne!(a.hex(), b.hex());
    }

    #[test]
    fn test_entry_routine_guard_shape() {
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "hello");
        nodes.set_entry_point(call);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains("let _lMain = _genLockObj();"));
        assert!(code.contains("function _main() {"));
        assert!(code.contains("if (_tryLock(_lMain)) {"));
        assert!(code.contains("_end: {"));
        assert!(code.contains("_unlock(_lMain);"));
        assert!(code.contains("_addEvent(_main, 'PROGRAM_START');"));
        assert!(code.trim_end().ends_with("_startTimer();"));
    }

    #[test]
    fn test_event_handler_registration_and_guard() {
        let mut nodes = NodeCollection::new();
        let lit = nodes.add(Node::NumLiteral(1.0));
        let handler = nodes.add_root(Node::EventHandler {
            trigger: EventTrigger::KeyPressed(
                graphscript_contracts::KeyCode::letter('a').unwrap(),
            ),
            body: vec![lit],
        });

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains(&format!("let _l{} = _genLockObj();", handler.hex())));
        assert!(code.contains(&format!("if (_tryLock(_l{})) {{", handler.hex())));
        assert!(code.contains(&format!(
            "_addEvent(_f{}, 'KEY_A_PRESSED');",
            handler.hex()
        )));
        // one _unlock per lock acquisition site
        assert_eq!(
            code.matches("_tryLock(").count(),
            code.matches("_unlock(").count()
        );
    }

    #[test]
    fn test_delayed_start_sleeps_then_registers_at_program_start() {
        let mut nodes = NodeCollection::new();
        let lit = nodes.add(Node::NumLiteral(1.0));
        let handler = nodes.add_root(Node::EventHandler {
            trigger: EventTrigger::DelayedStart { seconds: 3.0 },
            body: vec![lit],
        });

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains("_sleep(_ctx, 3);"));
        assert!(code.contains(&format!(
            "_addEvent(_f{}, 'PROGRAM_START');",
            handler.hex()
        )));
    }

    #[test]
    fn test_exception_tracing_catch_clause() {
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "x");
        nodes.set_entry_point(call);

        let mut opt = option();
        opt.exception_tracing = true;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(code.contains("} catch (_e) {"));
        assert!(code.contains("_traceException(_ctx, _e);"));
        assert!(code.contains("throw _e;"));

        opt.exception_tracing = false;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(!code.contains("catch"));
    }

    #[test]
    fn test_division_gets_finiteness_guard() {
        let mut nodes = NodeCollection::new();
        let left = nodes.add(Node::NumLiteral(1.0));
        let right = nodes.add(Node::NumLiteral(0.0));
        let div = nodes.add(Node::BinaryExpr {
            op: BinaryOp::Div,
            left,
            right,
        });
        nodes.set_entry_point(div);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        let raw = format!("_t{}r", div.hex());
        assert!(code.contains(&format!("const {} = ((1) / (0));", raw)));
        assert!(code.contains(&format!(
            "const _t{} = (Number.isFinite({})) ? {} : (1);",
            div.hex(),
            raw,
            raw
        )));
    }

    #[test]
    fn test_addition_gets_finiteness_guard() {
        // overflow to Infinity must fall back to the left operand, so
        // every arithmetic operator is guarded, not just div/mod
        let mut nodes = NodeCollection::new();
        let left = nodes.add(Node::NumLiteral(1.0));
        let right = nodes.add(Node::NumLiteral(2.0));
        let add = nodes.add(Node::BinaryExpr {
            op: BinaryOp::Add,
            left,
            right,
        });
        nodes.set_entry_point(add);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        let raw = format!("_t{}r", add.hex());
        assert!(code.contains(&format!("const {} = ((1) + (2));", raw)));
        assert!(code.contains(&format!(
            "const _t{} = (Number.isFinite({})) ? {} : (1);",
            add.hex(),
            raw,
            raw
        )));
    }

    #[test]
    fn test_no_guard_for_comparison_ops() {
        let mut nodes = NodeCollection::new();
        let left = nodes.add(Node::NumLiteral(1.0));
        let right = nodes.add(Node::NumLiteral(2.0));
        let cmp = nodes.add(Node::BinaryExpr {
            op: BinaryOp::Lt,
            left,
            right,
        });
        nodes.set_entry_point(cmp);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(!code.contains("Number.isFinite"));
        assert!(code.contains(&format!("const _t{} = ((1) < (2));", cmp.hex())));
    }

    #[test]
    fn test_guard_disabled_without_float_semantics() {
        let mut nodes = NodeCollection::new();
        let left = nodes.add(Node::NumLiteral(1.0));
        let right = nodes.add(Node::NumLiteral(0.0));
        let div = nodes.add(Node::BinaryExpr {
            op: BinaryOp::Div,
            left,
            right,
        });
        nodes.set_entry_point(div);

        let mut opt = option();
        opt.preserve_float_semantics = false;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(!code.contains("Number.isFinite"));
    }

    #[test]
    fn test_return_breaks_end_label() {
        let mut nodes = NodeCollection::new();
        let ret = nodes.add(Node::Return);
        let def = nodes.add_root(Node::FuncDef {
            name: "f".to_string(),
            params: vec![],
            out_params: vec![],
            body: vec![ret],
        });

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains(&format!("function _f{}(_ctx) {{", def.hex())));
        assert!(code.contains("break _end;"));
    }

    #[test]
    fn test_out_params_copied_back_in_order() {
        let mut nodes = NodeCollection::new();
        let p_out1 = nodes.add(Node::VarDecl {
            name: "q".to_string(),
            init: InitValue::Num(0.0),
            out_param: true,
        });
        let p_out2 = nodes.add(Node::VarDecl {
            name: "r".to_string(),
            init: InitValue::Num(0.0),
            out_param: true,
        });
        let def = nodes.add_root(Node::FuncDef {
            name: "divmod".to_string(),
            params: vec![],
            out_params: vec![p_out1, p_out2],
            body: vec![],
        });
        let a = nodes.add_root(Node::VarDecl {
            name: "a".to_string(),
            init: InitValue::Num(0.0),
            out_param: false,
        });
        let b = nodes.add_root(Node::VarDecl {
            name: "b".to_string(),
            init: InitValue::Num(0.0),
            out_param: false,
        });
        let ra = nodes.add(Node::VarRef { decl: a });
        let rb = nodes.add(Node::VarRef { decl: b });
        let call = nodes.add(Node::UserFuncCall {
            def,
            args: vec![],
            out_args: vec![ra, rb],
        });
        nodes.set_entry_point(call);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        // callee publishes its out params
        assert!(code.contains(&format!(
            "_ctx._outVals = [_v{}, _v{}];",
            p_out1.hex(),
            p_out2.hex()
        )));
        // caller passes out args as ordinary args and copies back in order
        assert!(code.contains(&format!(
            "_f{}(_ctx, _v{}, _v{})",
            def.hex(),
            a.hex(),
            b.hex()
        )));
        let first = code.find(&format!("_v{} = _ctx._outVals[0];", a.hex())).unwrap();
        let second = code.find(&format!("_v{} = _ctx._outVals[1];", b.hex())).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_while_reevaluates_condition_each_iteration() {
        let mut nodes = NodeCollection::new();
        let flag = nodes.add_root(Node::VarDecl {
            name: "go".to_string(),
            init: InitValue::Bool(true),
            out_param: false,
        });
        let cond = nodes.add(Node::VarRef { decl: flag });
        let body_stmt = nodes.add(Node::Continue);
        let while_node = nodes.add(Node::While {
            cond,
            body: vec![body_stmt],
        });
        nodes.set_entry_point(while_node);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains("while (true) {"));
        assert!(code.contains(&format!("if (!_v{}) {{ break; }}", flag.hex())));
    }

    #[test]
    fn test_repeat_evaluates_count_once() {
        let mut nodes = NodeCollection::new();
        let count = nodes.add(Node::NumLiteral(2.5));
        let body_stmt = nodes.add(Node::Continue);
        let repeat = nodes.add(Node::Repeat {
            count,
            body: vec![body_stmt],
        });
        nodes.set_entry_point(repeat);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        let limit = format!("_t{}c", repeat.hex());
        let index = format!("_t{}i", repeat.hex());
        assert!(code.contains(&format!("const {} = Math.floor((2.5));", limit)));
        assert!(code.contains(&format!(
            "for (let {} = 0; {} < {}; ++{}) {{",
            index, index, limit, index
        )));
    }

    #[test]
    fn test_critical_section_unlocks_in_finally() {
        let mut nodes = NodeCollection::new();
        let lock = nodes.add_root(Node::SyncDecl {
            name: "shared".to_string(),
            kind: SyncKind::Lock,
        });
        let body_stmt = nodes.add(Node::Continue);
        let section = nodes.add(Node::CriticalSection {
            lock,
            body: vec![body_stmt],
        });
        nodes.set_entry_point(section);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains(&format!("let _l{} = _genLockObj();", lock.hex())));
        assert!(code.contains(&format!("_lock(_l{});", lock.hex())));
        assert!(code.contains(&format!("_unlock(_l{});", lock.hex())));
        assert!(code.contains("} finally {"));
    }

    #[test]
    fn test_barrier_declaration() {
        let mut nodes = NodeCollection::new();
        let barrier = nodes.add_root(Node::SyncDecl {
            name: "meet".to_string(),
            kind: SyncKind::Barrier(3),
        });
        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains(&format!("let _l{} = _genBarrier(3);", barrier.hex())));
    }

    #[test]
    fn test_identity_builtin_forwards_argument() {
        let mut nodes = NodeCollection::new();
        let lit = nodes.add(Node::NumLiteral(7.0));
        let ident = nodes.add(Node::BuiltinCall {
            func: Builtin::Identity,
            args: vec![lit],
            out_args: vec![],
        });
        let print = nodes.add(Node::BuiltinCall {
            func: Builtin::Print,
            args: vec![ident],
            out_args: vec![],
        });
        nodes.set_entry_point(print);

        let code = compiler().generate(&mut nodes, &option()).unwrap();
        assert!(code.contains("_print(_ctx, (7))"));
        assert!(!code.contains("_identity"));
    }

    #[test]
    fn test_with_comments_names_declarations() {
        let mut nodes = NodeCollection::new();
        let decl = nodes.add_root(Node::VarDecl {
            name: "total".to_string(),
            init: InitValue::Num(0.0),
            out_param: false,
        });

        let mut opt = option();
        opt.with_comments = true;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(code.contains(&format!("let _v{} = 0; /*total*/", decl.hex())));

        opt.with_comments = false;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(!code.contains("/*total*/"));
    }

    #[test]
    fn test_local_and_remote_lib_selection() {
        let mut nodes = NodeCollection::new();
        let mut opt = option();
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(code.contains("// common lib"));
        assert!(code.contains("// local lib"));
        assert!(!code.contains("// remote lib"));

        opt.local_target = false;
        let code = compiler().generate(&mut nodes, &opt).unwrap();
        assert!(code.contains("// remote lib"));
        assert!(!code.contains("// local lib"));
    }

    #[test]
    fn test_compile_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("program.js");
        let mut nodes = NodeCollection::new();
        let call = print_literal(&mut nodes, "hello");
        nodes.set_entry_point(call);

        let mut opt = option();
        opt.out_file = out.clone();
        let path = compiler().compile(&mut nodes, &opt).unwrap();
        assert_eq!(path, out);
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("_print(_ctx, ('hello'))"));
    }

    #[test]
    fn test_failed_compile_preserves_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("program.js");
        std::fs::write(&out, "previous artifact").unwrap();

        // dangling node id makes generation fail
        let mut nodes = NodeCollection::new();
        let bad = nodes.add(Node::VarRef { decl: NodeId(999) });
        nodes.set_entry_point(bad);

        let mut opt = option();
        opt.out_file = out.clone();
        assert!(compiler().compile(&mut nodes, &opt).is_err());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous artifact");
    }
}
