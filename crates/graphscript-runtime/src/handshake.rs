//! Control-port handshake.
//!
//! A freshly started runtime prints one line ending in a fixed suffix;
//! everything before the suffix is its control TCP port. The output stream
//! is scanned line by line under a deadline, discarding lines without the
//! suffix (the process is free to print anything else first).

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, RuntimeControlError};
use crate::process::OutputRx;

/// Suffix marking the handshake line, e.g. `38452@ctrl-port`.
pub const PORT_LINE_SUFFIX: &str = "@ctrl-port";

/// Read lines from the merged output until one ends with `suffix`,
/// returning the line with the suffix stripped.
pub async fn read_suffixed_line(
    output: &mut OutputRx,
    suffix: &str,
    limit: Duration,
) -> Result<String> {
    let deadline = Instant::now() + limit;
    let mut line = String::new();
    loop {
        let chunk = match tokio::time::timeout_at(deadline, output.recv()).await {
            Err(_) => return Err(RuntimeControlError::HandshakeTimeout(limit)),
            Ok(None) => {
                return Err(RuntimeControlError::Channel(
                    "runtime output closed before handshake".to_string(),
                ))
            }
            Ok(Some(chunk)) => chunk,
        };
        for byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(token) = line.strip_suffix(suffix) {
                    return Ok(token.to_string());
                }
                line.clear();
            } else {
                line.push(byte as char);
            }
        }
    }
}

/// Wait for the runtime to announce its control port.
pub async fn discover_control_port(output: &mut OutputRx, limit: Duration) -> Result<u16> {
    let token = read_suffixed_line(output, PORT_LINE_SUFFIX, limit).await?;
    token
        .trim()
        .parse::<u16>()
        .map_err(|_| RuntimeControlError::MalformedHandshake(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel_with(chunks: &[&str]) -> OutputRx {
        let (tx, rx) = mpsc::channel(16);
        for chunk in chunks {
            tx.try_send(chunk.as_bytes().to_vec()).unwrap();
        }
        drop(tx);
        rx
    }

    #[tokio::test]
    async fn test_port_found_after_noise() {
        let mut rx = channel_with(&["starting up\n", "loading...\n38452@ctrl-port\nmore\n"]);
        let port = discover_control_port(&mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(port, 38452);
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let mut rx = channel_with(&["384", "52@ctrl", "-port\n"]);
        let port = discover_control_port(&mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(port, 38452);
    }

    #[tokio::test]
    async fn test_carriage_return_terminates_line() {
        let mut rx = channel_with(&["7777@ctrl-port\r\n"]);
        let port = discover_control_port(&mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(port, 7777);
    }

    #[tokio::test]
    async fn test_malformed_port_rejected() {
        let mut rx = channel_with(&["not-a-port@ctrl-port\n"]);
        match discover_control_port(&mut rx, Duration::from_secs(1)).await {
            Err(RuntimeControlError::MalformedHandshake(token)) => {
                assert_eq!(token, "not-a-port");
            }
            other => panic!("expected malformed handshake, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_no_handshake_arrives() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let limit = Duration::from_secs(10);
        let result = discover_control_port(&mut rx, limit).await;
        drop(tx);
        assert!(matches!(
            result,
            Err(RuntimeControlError::HandshakeTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_is_distinct_from_timeout() {
        let mut rx = channel_with(&["partial line without newline"]);
        match discover_control_port(&mut rx, Duration::from_secs(1)).await {
            Err(RuntimeControlError::Channel(_)) => {}
            other => panic!("expected channel error, got {:?}", other),
        }
    }
}
