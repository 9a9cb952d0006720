//! Line-delimited JSON-RPC over standard input and output.

use crate::mcp::server::{encode_response, McpHandler};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Serves the process's own stdin/stdout until stdin closes.
pub async fn run(handler: &McpHandler) -> std::io::Result<()> {
    info!("Serving MCP over stdio");
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    serve(handler, reader, writer).await
}

/// Reads one message per line and writes one response per line. Requests are
/// handled in order; notifications produce no output.
pub async fn serve<R, W>(handler: &McpHandler, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            debug!("stdin closed");
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        if let Some(response) = handler.handle_message(message).await {
            writer.write_all(encode_response(&response).as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::core::config::{ConfigStore, EnvOverrides};
    use crate::core::pdf::PopplerInspector;
    use crate::core::upload::tests::FakeRemote;
    use crate::tools::ToolContext;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn answers_each_request_line_and_skips_notifications() {
        let dir = TempDir::new().expect("tempdir");
        let ctx = ToolContext::new(
            Arc::new(ConfigStore::new(
                dir.path().join("config.toml"),
                EnvOverrides::default(),
            )),
            Arc::new(FakeRemote::default()),
            Arc::new(PopplerInspector),
        );
        let handler = McpHandler::for_context(ctx, Arc::new(SystemClock));

        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
            String::new(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "config_status"
            }})
            .to_string(),
        ]
        .join("\n");
        let mut output = Vec::new();
        serve(&handler, input.as_bytes(), &mut output)
            .await
            .expect("serve");

        let lines: Vec<Value> = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], json!(1));
        assert_eq!(lines[1]["id"], json!(2));
        assert_eq!(lines[1]["result"]["isError"], json!(false));
    }
}
