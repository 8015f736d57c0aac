//! Shared value types for the graphscript compiler and runtime control layer.
//!
//! Everything that crosses the control channel between the host application
//! and a running script program lives here, along with the `MessageSink`
//! seam through which both sides talk to the user.

pub mod event;
pub mod message;
pub mod sink;

pub use event::{EventName, KeyCode};
pub use message::{
    FrameId, ProgramEvent, ProgramMessage, ProgramNotification, RuntimeStatus, ThreadContext,
};
pub use sink::{ConfirmAnswer, ConfirmRequest, MessageSink, NullMessageSink, VecMessageSink};
