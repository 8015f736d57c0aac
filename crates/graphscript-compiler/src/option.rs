//! Per-compile settings.

use std::path::PathBuf;

/// Settings for one compile invocation. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompileOption {
    /// Whether the program will run on this machine (selects the local or
    /// remote support library fragment).
    pub local_target: bool,
    /// Emit call-stack push/pop instrumentation around call sites.
    pub debug_instrumentation: bool,
    /// Guard division results so non-finite values fall back to a defined
    /// value instead of propagating.
    pub preserve_float_semantics: bool,
    /// Emit catch clauses that report uncaught exceptions before rethrowing.
    pub exception_tracing: bool,
    /// Annotate generated declarations with the user-visible names.
    pub with_comments: bool,
    /// Where the artifact is written.
    pub out_file: PathBuf,
}

impl CompileOption {
    /// Options for a program that runs on this machine.
    pub fn local(out_file: impl Into<PathBuf>) -> Self {
        Self {
            local_target: true,
            debug_instrumentation: true,
            preserve_float_semantics: true,
            exception_tracing: true,
            with_comments: false,
            out_file: out_file.into(),
        }
    }

    /// Options for a program that runs on a remote machine.
    pub fn remote(out_file: impl Into<PathBuf>) -> Self {
        Self {
            local_target: false,
            ..Self::local(out_file)
        }
    }
}
