//! Transport Server (spec §4.H): accepts connections on a local-socket
//! endpoint, frames each request/response as a 4-byte big-endian length
//! prefix followed by a UTF-8 JSON object, and enforces per-call deadlines
//! plus a bounded-drain graceful shutdown.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ai_rpc::{Dispatcher, RawRequest, RawResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub socket_path: String,
    pub listen_address: String,
    pub max_connections: usize,
    pub call_timeout: Duration,
    pub shutdown_timeout: Duration,
}

/// Runs the accept loop until `shutdown` is cancelled, then drains
/// in-flight connections for up to `config.shutdown_timeout` before
/// returning.
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    config: TransportConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(config.max_connections));
    let mut tasks = JoinSet::new();

    accept_loop(&dispatcher, &config, &shutdown, &permits, &mut tasks).await?;

    tracing::info!("transport shutting down, draining in-flight connections");
    let drain = tokio::time::timeout(config.shutdown_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drain.is_err() {
        tracing::warn!("shutdown drain deadline exceeded, aborting remaining connections");
        tasks.shutdown().await;
    }
    Ok(())
}

#[cfg(unix)]
async fn accept_loop(
    dispatcher: &Arc<Dispatcher>,
    config: &TransportConfig,
    shutdown: &CancellationToken,
    permits: &Arc<Semaphore>,
    tasks: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::net::UnixListener;

    if std::fs::metadata(&config.socket_path).is_ok() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o660))?;
    tracing::info!(socket_path = %config.socket_path, "listening on unix socket");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                spawn_connection(stream, dispatcher, config, shutdown, permits, tasks);
            }
        }
    }
}

#[cfg(not(unix))]
async fn accept_loop(
    dispatcher: &Arc<Dispatcher>,
    config: &TransportConfig,
    shutdown: &CancellationToken,
    permits: &Arc<Semaphore>,
    tasks: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(&config.listen_address).await?;
    tracing::info!(listen_address = %config.listen_address, "listening on tcp");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                spawn_connection(stream, dispatcher, config, shutdown, permits, tasks);
            }
        }
    }
}

fn spawn_connection<S>(
    stream: S,
    dispatcher: &Arc<Dispatcher>,
    config: &TransportConfig,
    shutdown: &CancellationToken,
    permits: &Arc<Semaphore>,
    tasks: &mut JoinSet<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Ok(permit) = permits.clone().try_acquire_owned() else {
        tracing::warn!("max_connections reached, rejecting new connection");
        drop(stream);
        return;
    };
    let dispatcher = dispatcher.clone();
    let conn_ctx = shutdown.child_token();
    let call_timeout = config.call_timeout;
    tasks.spawn(async move {
        let _permit = permit;
        if let Err(err) = handle_connection(stream, dispatcher, conn_ctx, call_timeout).await {
            tracing::debug!(%err, "connection closed");
        }
    });
}

async fn handle_connection<S>(
    mut stream: S,
    dispatcher: Arc<Dispatcher>,
    ctx: CancellationToken,
    call_timeout: Duration,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let request = match read_frame(&mut stream).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(()),
            Err(err) => return Err(err),
        };

        let raw: RawRequest = match serde_json::from_slice(&request) {
            Ok(raw) => raw,
            Err(err) => {
                let response = RawResponse::failure(
                    format!("malformed request envelope: {err}"),
                    serde_json::json!({ "status": "InvalidArgument" }),
                );
                write_frame(&mut stream, &response).await?;
                continue;
            }
        };

        let call_ctx = ctx.child_token();
        let deadline_ctx = call_ctx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(call_timeout).await;
            deadline_ctx.cancel();
        });
        let response = dispatcher.dispatch(&call_ctx, raw).await;
        timer.abort();

        write_frame(&mut stream, &response).await?;
    }
}

async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds max size"));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, response: &RawResponse) -> io::Result<()> {
    let body = serde_json::to_vec(response).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let len = (body.len() as u32).to_be_bytes();
    stream.write_all(&len).await?;
    stream.write_all(&body).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_round_trips_through_a_stream() {
        let (mut client, mut server) = duplex(1024);
        let response = RawResponse::success(serde_json::json!("ok"), serde_json::json!({}));
        write_frame(&mut server, &response).await.unwrap();
        let frame = read_frame(&mut client).await.unwrap().unwrap();
        let decoded: RawResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn read_frame_returns_none_on_clean_eof() {
        let (mut client, server) = duplex(64);
        drop(server);
        let frame = read_frame(&mut client).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_length_prefix() {
        let (mut client, mut server) = duplex(1024);
        let huge = (MAX_FRAME_BYTES + 1).to_be_bytes();
        server.write_all(&huge).await.unwrap();
        let err = read_frame(&mut client).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn serve_accepts_a_connection_and_answers_capabilities() {
        use std::collections::BTreeMap;
        use tokio::net::UnixStream;

        let mut services = BTreeMap::new();
        services.insert(
            "ollama".to_string(),
            ai_common::ServiceConfig {
                enabled: true,
                provider: "ollama".to_string(),
                endpoint: Some("http://127.0.0.1:1".to_string()),
                api_key: None,
                model: "qwen2".to_string(),
                max_tokens: 64,
                timeout: Duration::from_millis(200),
                priority: 0,
            },
        );
        let ai_config = ai_common::AiConfig {
            default_service: "ollama".to_string(),
            fallback_order: Vec::new(),
            timeout: Duration::from_secs(5),
            services,
            retry: ai_common::RetryConfig::default(),
        };
        let manager = Arc::new(ai_manager::AIManager::new(ai_config).await.unwrap());
        let dispatcher = Arc::new(Dispatcher::new(manager));

        let socket_path = format!("/tmp/atest-ext-ai-transport-test-{}.sock", std::process::id());
        let _ = std::fs::remove_file(&socket_path);
        let config = TransportConfig {
            socket_path: socket_path.clone(),
            listen_address: "127.0.0.1:0".to_string(),
            max_connections: 4,
            call_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_millis(500),
        };
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move { serve(dispatcher, config, server_shutdown).await });

        // Give the accept loop a moment to bind before connecting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        let request = RawRequest {
            kind: "ai".to_string(),
            key: "capabilities".to_string(),
            sql: None,
            config: None,
        };
        let body = serde_json::to_vec(&request).unwrap();
        client.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        client.write_all(&body).await.unwrap();

        let frame = read_frame(&mut client).await.unwrap().unwrap();
        let response: RawResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(response.success, "true");

        shutdown.cancel();
        server_task.await.unwrap().unwrap();
        let _ = std::fs::remove_file(&socket_path);
    }
}
