//! Routes messages received from a running program.

use std::sync::Arc;

use graphscript_contracts::{MessageSink, ProgramMessage, ThreadContext};

/// Turns program messages into user-facing output.
pub struct MessageProcessor {
    sink: Arc<dyn MessageSink>,
}

impl MessageProcessor {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub fn process(&self, msg: ProgramMessage) {
        match msg {
            ProgramMessage::OutputText { text } => self.sink.info(&text),
            ProgramMessage::Exception { message, context } => {
                self.sink.error(&render_exception(&message, &context));
            }
        }
    }
}

/// Render an exception report: the message, any detail text the runtime
/// attached, then the call stack with the oldest frame last.
pub(crate) fn render_exception(message: &str, ctx: &ThreadContext) -> String {
    let mut out = String::from(message);
    if let Some(detail) = &ctx.message {
        if !detail.is_empty() {
            out.push('\n');
            out.push_str(detail);
        }
    }
    out.push_str(&format!("\nthread {} call stack:", ctx.thread_id));
    if ctx.call_stack.is_empty() {
        out.push_str("\n  (empty)");
    } else {
        for frame in ctx.call_stack.iter().rev() {
            out.push_str(&format!("\n  at node {:x}", frame));
        }
    }
    if ctx.error {
        out.push_str("\nthe thread stopped on this error.");
    }
    out
}
