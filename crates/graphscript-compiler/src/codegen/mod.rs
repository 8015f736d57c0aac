//! Code generation.
//!
//! Each submodule covers one slice of the generated program; this module
//! holds the pieces they all share: the emitter, the fixed identifiers of
//! the runtime support library, and the name scheme tying generated
//! identifiers to node ids.

pub(crate) mod decl;
pub(crate) mod event;
pub(crate) mod expr;
pub(crate) mod func;
pub(crate) mod stmt;

use crate::node::NodeId;
use crate::option::CompileOption;

/// Fixed identifiers the generated code shares with the runtime library.
pub(crate) mod idents {
    /// Prefix of generated variable names.
    pub const VAR_PREFIX: &str = "_v";
    /// Prefix of generated function names.
    pub const FUNC_PREFIX: &str = "_f";
    /// Prefix of generated lock names.
    pub const LOCK_PREFIX: &str = "_l";
    /// Prefix of generated temporaries.
    pub const TMP_PREFIX: &str = "_t";

    /// Label wrapping every function body; `return` compiles to a break
    /// out of it.
    pub const END_LABEL: &str = "_end";
    /// The per-invocation call context.
    pub const CALL_CTX: &str = "_ctx";
    /// Slot on the call context holding out-parameter values.
    pub const OUT_VALS: &str = "_outVals";
    /// Name of the entry routine.
    pub const MAIN_FUNC: &str = "_main";
    /// Lock guarding the entry routine against re-entry.
    pub const MAIN_LOCK: &str = "_lMain";

    pub const ADD_EVENT: &str = "_addEvent";
    pub const START_TIMER: &str = "_startTimer";
    pub const GEN_LOCK_OBJ: &str = "_genLockObj";
    pub const GEN_BARRIER: &str = "_genBarrier";
    pub const TRY_LOCK: &str = "_tryLock";
    pub const LOCK: &str = "_lock";
    pub const UNLOCK: &str = "_unlock";
    pub const SLEEP: &str = "_sleep";
    pub const NEW_CALL_CTX: &str = "_newCallCtx";
    pub const PUSH_CALL_STACK: &str = "_pushCallStack";
    pub const POP_CALL_STACK: &str = "_popCallStack";
    pub const TRACE_EXCEPTION: &str = "_traceException";
}

/// Appends generated lines with indentation tracking.
pub(crate) struct Emitter {
    buf: String,
    depth: usize,
}

const INDENT: &str = "  ";

impl Emitter {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            depth: 0,
        }
    }

    /// Append one indented line.
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    /// Append pre-formatted text verbatim.
    pub fn raw(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn into_code(self) -> String {
        self.buf
    }
}

/// Generated name of the variable declared by `id`.
pub(crate) fn var_name(id: NodeId) -> String {
    format!("{}{}", idents::VAR_PREFIX, id.hex())
}

/// Generated name of the function defined by `id`.
pub(crate) fn func_name(id: NodeId) -> String {
    format!("{}{}", idents::FUNC_PREFIX, id.hex())
}

/// Generated name of the lock declared by (or guarding) `id`.
pub(crate) fn lock_name(id: NodeId) -> String {
    format!("{}{}", idents::LOCK_PREFIX, id.hex())
}

/// Generated name of the temporary holding the result of expression `id`.
pub(crate) fn tmp_name(id: NodeId) -> String {
    format!("{}{}", idents::TMP_PREFIX, id.hex())
}

/// Render a number literal the way the script language writes it.
pub(crate) fn num_literal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Render a string literal with single quotes, escaping as needed.
pub(crate) fn str_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a call expression. Every generated function takes the call
/// context as its first argument.
pub(crate) fn call_text(callee: &str, args: &[String]) -> String {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(idents::CALL_CTX.to_string());
    all.extend_from_slice(args);
    format!("{}({})", callee, all.join(", "))
}

/// Emit call-stack instrumentation entering a call site.
pub(crate) fn push_call_stack(em: &mut Emitter, site: NodeId, opt: &CompileOption) {
    if opt.debug_instrumentation {
        em.line(&format!(
            "{}({}, '{}');",
            idents::PUSH_CALL_STACK,
            idents::CALL_CTX,
            site.hex()
        ));
    }
}

/// Emit call-stack instrumentation leaving a call site.
pub(crate) fn pop_call_stack(em: &mut Emitter, opt: &CompileOption) {
    if opt.debug_instrumentation {
        em.line(&format!(
            "{}({});",
            idents::POP_CALL_STACK,
            idents::CALL_CTX
        ));
    }
}

/// The trailing comment annotating a generated symbol with its
/// user-visible name, or an empty string when comments are off.
pub(crate) fn name_comment(name: &str, opt: &CompileOption) -> String {
    if opt.with_comments {
        format!(" /*{}*/", name)
    } else {
        String::new()
    }
}
