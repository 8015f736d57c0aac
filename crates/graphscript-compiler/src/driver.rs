//! Compile driver.
//!
//! Thin orchestration over [`Compiler`]: registers the entry point with
//! the collection, runs the compile, and reports the outcome to the user.

use std::path::PathBuf;
use std::sync::Arc;

use graphscript_contracts::MessageSink;

use crate::compiler::Compiler;
use crate::error::Result;
use crate::node::{NodeCollection, NodeId};
use crate::option::CompileOption;

/// Runs compiles and reports results through a [`MessageSink`].
pub struct CompileDriver {
    compiler: Compiler,
    sink: Arc<dyn MessageSink>,
}

impl CompileDriver {
    pub fn new(compiler: Compiler, sink: Arc<dyn MessageSink>) -> Self {
        Self { compiler, sink }
    }

    /// Compile the collection, using `entry` as the entry point.
    ///
    /// Returns the artifact path on success. Failures are reported to the
    /// sink and returned to the caller.
    pub fn compile(
        &self,
        entry: Option<NodeId>,
        nodes: &mut NodeCollection,
        option: &CompileOption,
    ) -> Result<PathBuf> {
        if let Some(entry) = entry {
            nodes.set_entry_point(entry);
        }
        match self.compiler.compile(nodes, option) {
            Ok(path) => {
                self.sink.info("Compiled the program.");
                Ok(path)
            }
            Err(e) => {
                log::error!("compile failed: {}", e);
                self.sink.error(&format!("Failed to compile the program.\n{}", e));
                Err(e)
            }
        }
    }
}
