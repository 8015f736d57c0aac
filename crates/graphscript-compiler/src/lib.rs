//! graphscript-compiler: turns a validated node graph into script text.
//!
//! The pipeline is deliberately simple: a preprocessor pass normalizes the
//! graph, a set of code generators walk it in a fixed order, and the driver
//! writes the artifact atomically. Names in the generated program are
//! derived from stable node ids, so the same graph always compiles to the
//! same text.

pub mod builtin;
pub mod compiler;
pub mod driver;
pub mod error;
pub mod node;
pub mod option;
pub mod preprocess;

mod codegen;

pub use builtin::Builtin;
pub use compiler::Compiler;
pub use driver::CompileDriver;
pub use error::{CompileError, Result};
pub use node::{
    BinaryOp, EventTrigger, InitValue, Node, NodeCollection, NodeId, SyncKind, UnaryOp,
};
pub use option::CompileOption;
pub use preprocess::preprocess;
