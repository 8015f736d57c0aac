//! Control-channel wire format.
//!
//! One JSON object per line, each tagged with a `type` field. The same
//! connection carries the service lookup at setup time and program traffic
//! afterwards.

use graphscript_contracts::{ProgramEvent, ProgramMessage, ProgramNotification};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, RuntimeControlError};

/// A frame on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ControlFrame {
    /// Host asks for a named service.
    #[serde(rename_all = "camelCase")]
    Resolve { service: String },

    /// Runtime answers a resolve request.
    #[serde(rename_all = "camelCase")]
    Resolved { service: String, found: bool },

    /// Host opens program message flow.
    Connect,

    /// Host stops program message flow.
    Disconnect,

    /// Host asks the runtime to load and run a script file.
    #[serde(rename_all = "camelCase")]
    RunScript {
        file: String,
        start_event: ProgramEvent,
    },

    /// Runtime answers a run request.
    #[serde(rename_all = "camelCase")]
    RunScriptResult { success: bool },

    /// Host-to-runtime program notification.
    #[serde(rename_all = "camelCase")]
    Notification { notification: ProgramNotification },

    /// Runtime-to-host program message.
    #[serde(rename_all = "camelCase")]
    Message { message: ProgramMessage },
}

/// Write one frame as a JSON line.
pub(crate) async fn write_frame<W>(writer: &mut W, frame: &ControlFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `None` on a cleanly closed connection.
pub(crate) async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<ControlFrame>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(RuntimeControlError::Channel(
            "empty control frame".to_string(),
        ));
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphscript_contracts::EventName;

    #[tokio::test]
    async fn test_frame_roundtrip_over_buffer() {
        let frame = ControlFrame::RunScript {
            file: "/tmp/p.js".to_string(),
            start_event: ProgramEvent::new(EventName::ProgramStart),
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        let back = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(back, frame);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_field_on_wire() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &ControlFrame::Connect).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"type\":\"connect\""));
        assert!(text.ends_with('\n'));
    }
}
