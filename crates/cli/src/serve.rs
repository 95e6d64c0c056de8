//! Daemon mode – minimal JSON-RPC-ish protocol over a Unix socket or TCP.
//!
//! One request per line: `{"id": "...", "method": "call"|"probe"|"doctor"|"list", "params": {...}}`.
//! Each connection is served on its own task, so a long format on one
//! connection does not block list calls on another.

use engine::types::*;
use engine::{AppContext, CommandRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub enum Endpoint {
    #[cfg(unix)]
    Socket(PathBuf),
    Tcp(String),
}

pub async fn run_daemon(endpoint: Endpoint, ctx: AppContext, registry: CommandRegistry) {
    let ctx = Arc::new(ctx);
    let registry = Arc::new(registry);
    match endpoint {
        #[cfg(unix)]
        Endpoint::Socket(path) => serve_unix(path, ctx, registry).await,
        Endpoint::Tcp(addr) => serve_tcp(&addr, ctx, registry).await,
    }
}

#[cfg(unix)]
async fn serve_unix(socket_path: PathBuf, ctx: Arc<AppContext>, registry: Arc<CommandRegistry>) {
    use tokio::net::UnixListener;

    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: cannot bind socket {}: {}", socket_path.display(), e);
            std::process::exit(2);
        }
    };

    tracing::info!(socket = %socket_path.display(), "adminctl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let (reader, writer) = stream.into_split();
                tokio::spawn(serve_connection(reader, writer, ctx.clone(), registry.clone()));
            }
            Err(e) => tracing::warn!(error = %e, "accept error"),
        }
    }
}

async fn serve_tcp(addr: &str, ctx: Arc<AppContext>, registry: Arc<CommandRegistry>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: cannot listen on {}: {}", addr, e);
            std::process::exit(2);
        }
    };

    tracing::info!(%addr, "adminctl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "connection accepted");
                let (reader, writer) = stream.into_split();
                tokio::spawn(serve_connection(reader, writer, ctx.clone(), registry.clone()));
            }
            Err(e) => tracing::warn!(error = %e, "accept error"),
        }
    }
}

async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    ctx: Arc<AppContext>,
    registry: Arc<CommandRegistry>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_request(&line, &ctx, &registry).await;
        let mut resp_json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
        resp_json.push('\n');
        if writer.write_all(resp_json.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn error_response(id: String, message: String) -> DaemonResponse {
    DaemonResponse {
        id,
        result: None,
        error: Some(ErrorInfo::new(ErrorCode::InvalidInput, message)),
    }
}

async fn handle_request(
    line: &str,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return error_response("unknown".into(), format!("invalid JSON request: {}", e)),
    };

    let result = match req.method.as_str() {
        "call" => {
            let cmd_name = req.params.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            let args = req
                .params
                .get("args")
                .cloned()
                .unwrap_or(serde_json::Value::Object(Default::default()));
            registry.execute(cmd_name, args, ctx).await
        }
        "probe" => {
            let target = req
                .params
                .get("target")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            engine::probes::run_probe(target, ctx).await
        }
        "doctor" => engine::doctor::run_doctor(&ctx.config),
        "list" => {
            let mut r = result_ok("list", "commands", &new_run_id(), 0);
            r.data = Some(serde_json::json!(registry.list()));
            r
        }
        other => return error_response(req.id, format!("unknown method: {}", other)),
    };

    DaemonResponse {
        id: req.id,
        result: Some(result),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_request() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let line = r#"{"id":"1","method":"call","params":{"cmd":"terminate_process","args":{"pid":4}}}"#;
        let resp = handle_request(line, &ctx, &reg).await;
        assert_eq!(resp.id, "1");
        let result = resp.result.unwrap();
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.data, Some(serde_json::json!(false)));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let resp = handle_request("not json", &ctx, &reg).await;
        assert_eq!(resp.id, "unknown");
        assert!(resp.error.is_some());
        let resp = handle_request(r#"{"id":"2","method":"reboot"}"#, &ctx, &reg).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let ctx = Arc::new(AppContext::default_simulated());
        let reg = Arc::new(CommandRegistry::new());
        let (client, server) = tokio::io::duplex(4096);
        let (sr, sw) = tokio::io::split(server);
        tokio::spawn(serve_connection(sr, sw, ctx, reg));

        let (cr, mut cw) = tokio::io::split(client);
        cw.write_all(b"{\"id\":\"a\",\"method\":\"call\",\"params\":{\"cmd\":\"ping\"}}\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(cr).lines();
        let reply = lines.next_line().await.unwrap().unwrap();
        let resp: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(resp["id"], "a");
        assert_eq!(resp["result"]["status"], "pass");
    }
}
