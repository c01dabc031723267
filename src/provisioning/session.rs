use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// tmate prints this before the shareable connection string.
pub const SESSION_MARKER: &str = "ssh session:";

/// Command run inside the container to start a tmate session in the
/// foreground, so its stdout can be scanned.
pub fn session_command() -> Vec<String> {
    vec!["tmate".to_string(), "-F".to_string()]
}

/// Reads `reader` line by line until a line contains `marker`, and returns
/// the trimmed text after it. Returns `None` when the stream ends first.
pub async fn capture_session_line<R>(reader: R, marker: &str) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(idx) = line.find(marker) {
            let token = line[idx + marker.len()..].trim();
            if !token.is_empty() {
                return Ok(Some(token.to_string()));
            }
        }
    }
    Ok(None)
}
