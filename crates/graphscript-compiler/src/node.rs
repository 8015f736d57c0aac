//! The node graph the compiler consumes.
//!
//! Graphs arrive already validated by the editing layer; the compiler only
//! walks them. Nodes form one closed union so every consumer dispatches
//! exhaustively, and the collection owns its nodes in an arena keyed by
//! stable ids. Ids never change for the life of a node, which is what makes
//! generated names reproducible across compiles.

use std::collections::BTreeMap;
use std::fmt;

use graphscript_contracts::{EventName, KeyCode};

use crate::builtin::Builtin;
use crate::error::{CompileError, Result};

/// Stable identifier of a node. The hex form of the id appears in every
/// generated name derived from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Hex form used in generated identifiers.
    pub fn hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Binary operators available in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Operator token in the generated script.
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "===",
            Self::Ne => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Whether this operator can produce a non-finite number from finite
    /// operands and therefore gets the finiteness fallback. Covers all
    /// five arithmetic operators: add/sub/mul can overflow to Infinity,
    /// div/mod can also yield NaN.
    pub fn may_produce_non_finite(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }
}

/// Unary operators available in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}

/// Initial value of a variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum InitValue {
    Num(f64),
    Str(String),
    Bool(bool),
    /// An empty list.
    List,
}

/// A shared synchronization resource declared at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// A mutual-exclusion lock.
    Lock,
    /// A barrier that releases when the given number of threads arrive.
    Barrier(u32),
}

/// What fires an event handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTrigger {
    /// Runs once at program start.
    ProgramStart,
    /// Runs at program start after sleeping the given number of seconds.
    DelayedStart { seconds: f64 },
    /// Runs each time the key is pressed.
    KeyPressed(KeyCode),
}

impl EventTrigger {
    /// The event the generated handler is registered under.
    pub fn event_name(&self) -> EventName {
        match self {
            Self::ProgramStart | Self::DelayedStart { .. } => EventName::ProgramStart,
            Self::KeyPressed(key) => EventName::KeyPressed(*key),
        }
    }
}

/// A node in the program graph.
///
/// One closed union covering declarations, expressions, and statements.
/// Expression nodes may also appear in statement position, in which case
/// their result is discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // --- expressions ---
    NumLiteral(f64),
    StrLiteral(String),
    BoolLiteral(bool),
    /// An empty list literal.
    ListLiteral,

    /// Reference to a variable declaration.
    VarRef { decl: NodeId },

    BinaryExpr {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },

    UnaryExpr { op: UnaryOp, operand: NodeId },

    /// Call to a builtin function. Out-arguments must reference variables;
    /// their values are copied back after the call in parameter order.
    BuiltinCall {
        func: Builtin,
        args: Vec<NodeId>,
        out_args: Vec<NodeId>,
    },

    /// Call to a user-defined function.
    UserFuncCall {
        def: NodeId,
        args: Vec<NodeId>,
        out_args: Vec<NodeId>,
    },

    /// Converts a list variable to display text. The label is filled in by
    /// the preprocessor from the referenced variable's declared name.
    ListToText { list: NodeId, label: String },

    // --- statements ---
    Assign {
        target: NodeId,
        value: NodeId,
        /// Add the value to the target instead of replacing it.
        add: bool,
    },

    If {
        cond: NodeId,
        then_body: Vec<NodeId>,
        else_body: Option<Vec<NodeId>>,
    },

    While { cond: NodeId, body: Vec<NodeId> },

    /// Runs the body a fixed number of times; the count expression is
    /// evaluated once, before the first iteration.
    Repeat { count: NodeId, body: Vec<NodeId> },

    /// A block with its own local declarations.
    Compound {
        locals: Vec<NodeId>,
        body: Vec<NodeId>,
    },

    Break,
    Continue,
    /// Exits the enclosing function or handler body.
    Return,

    /// Body runs while holding the referenced lock.
    CriticalSection { lock: NodeId, body: Vec<NodeId> },

    // --- declarations ---
    VarDecl {
        /// User-visible name, kept for comments and list-to-text labels.
        name: String,
        init: InitValue,
        /// Declared as an out-parameter of the enclosing function.
        out_param: bool,
    },

    SyncDecl { name: String, kind: SyncKind },

    FuncDef {
        name: String,
        params: Vec<NodeId>,
        out_params: Vec<NodeId>,
        body: Vec<NodeId>,
    },

    EventHandler {
        trigger: EventTrigger,
        body: Vec<NodeId>,
    },
}

/// Arena of nodes plus the compile target set.
///
/// Iteration order is the id order, so walking the collection is
/// deterministic regardless of insertion history.
#[derive(Debug, Clone, Default)]
pub struct NodeCollection {
    nodes: BTreeMap<NodeId, Node>,
    roots: Vec<NodeId>,
    entry_point: Option<NodeId>,
    next_id: u64,
}

impl NodeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its id. Ids are assigned in insertion order
    /// and never reused.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    /// Add a node and register it as a compile target.
    pub fn add_root(&mut self, node: Node) -> NodeId {
        let id = self.add(node);
        self.roots.push(id);
        id
    }

    /// Register an existing node as a compile target if it is not one yet.
    pub fn ensure_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// The statement the entry routine runs, if any.
    pub fn entry_point(&self) -> Option<NodeId> {
        self.entry_point
    }

    pub fn set_entry_point(&mut self, id: NodeId) {
        self.entry_point = Some(id);
    }

    /// Top-level compile targets, in registration order.
    pub fn root_nodes(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(CompileError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or(CompileError::UnknownNode(id))
    }

    /// All node ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Resolve a node that must denote a variable declaration, following
    /// one level of variable reference.
    pub fn resolve_var_decl(&self, id: NodeId) -> Result<NodeId> {
        match self.node(id)? {
            Node::VarDecl { .. } => Ok(id),
            Node::VarRef { decl } => match self.node(*decl)? {
                Node::VarDecl { .. } => Ok(*decl),
                _ => Err(CompileError::NotAVariable(id)),
            },
            _ => Err(CompileError::NotAVariable(id)),
        }
    }
}
