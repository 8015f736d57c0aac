//! Messages exchanged with a running script program.
//!
//! `ProgramNotification` flows from the host to the runtime,
//! `ProgramMessage` flows back. Both are serialized as JSON with a `type`
//! tag on the control channel.

use serde::{Deserialize, Serialize};

use crate::event::EventName;

/// Identifier of the graph node a call-stack frame was recorded for.
pub type FrameId = u64;

/// Name of the runtime-side function that maps an event name to its
/// registered handlers.
pub const DEFAULT_HANDLER_RESOLVER: &str = "_getEventHandlers";

/// Snapshot of a runtime thread attached to an exception report.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    /// Runtime thread the exception was raised on.
    pub thread_id: u64,
    /// Call stack at the time of the report, oldest frame first.
    pub call_stack: Vec<FrameId>,
    /// Detail text attached by the runtime, if any.
    pub message: Option<String>,
    /// Whether the thread stopped on an error.
    pub error: bool,
}

/// An event to fire inside the runtime, together with the name of the
/// function the runtime uses to look up the handlers registered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramEvent {
    pub name: EventName,
    pub handler_resolver: String,
}

impl ProgramEvent {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            handler_resolver: DEFAULT_HANDLER_RESOLVER.to_string(),
        }
    }

    /// The event fired once when a program starts.
    pub fn program_start() -> Self {
        Self::new(EventName::ProgramStart)
    }
}

/// Notification sent from the host to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgramNotification {
    /// Fire the handlers registered for an event.
    #[serde(rename_all = "camelCase")]
    FireEvent { event: ProgramEvent },

    /// Deliver a line of text the user typed.
    #[serde(rename_all = "camelCase")]
    InputText { text: String },
}

/// Message sent from the runtime to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgramMessage {
    /// Plain program output to show to the user.
    #[serde(rename_all = "camelCase")]
    OutputText { text: String },

    /// An uncaught exception raised by the program.
    #[serde(rename_all = "camelCase")]
    Exception {
        message: String,
        context: ThreadContext,
    },
}

/// Outcome of handing a notification to the send queue.
///
/// Sending never throws and never blocks; callers always get one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    /// The notification was queued for delivery.
    Success,
    /// No connected transceiver was available.
    SendWhenDisconnected,
    /// The bounded send queue was full.
    SendQueueFull,
}

impl RuntimeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyCode;

    #[test]
    fn test_notification_wire_format() {
        let n = ProgramNotification::FireEvent {
            event: ProgramEvent::new(EventName::KeyPressed(KeyCode::Space)),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"type\":\"fireEvent\""));
        assert!(json.contains("KEY_SPACE_PRESSED"));

        let back: ProgramNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn test_exception_message_roundtrip() {
        let m = ProgramMessage::Exception {
            message: "division by zero".to_string(),
            context: ThreadContext {
                thread_id: 3,
                call_stack: vec![0x10, 0x2a],
                message: Some("at line 4".to_string()),
                error: true,
            },
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"callStack\":[16,42]"));
        assert!(json.contains("\"error\":true"));

        let back: ProgramMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
