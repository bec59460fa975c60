//! TCP search server.
//!
//! Each connection carries exactly one `search` request. Results are written
//! as separate response lines sharing the request's id, flushed one at a
//! time, and the connection is closed afterwards.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use domain_highlights::{HighlightError, SearchService, from_rpc_params};
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::framing::{
    FrameError, INTERNAL_ERROR, INVALID_PARAMS, JsonRpcCodec, METHOD_NOT_FOUND, Message,
    SEARCH_METHOD, SERVER_SHUTTING_DOWN,
};

/// How long shutdown waits for in-flight connections before notifying them
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long notified connections get to close before they are aborted
const NOTIFY_WINDOW: Duration = Duration::from_secs(1);

type Reader<R> = FramedRead<R, JsonRpcCodec>;
type Writer<W> = FramedWrite<W, JsonRpcCodec>;

pub struct McpServer {
    listener: TcpListener,
    service: Arc<dyn SearchService>,
    shutdown_grace: Duration,
}

impl McpServer {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        service: Arc<dyn SearchService>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes, then drain.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Self {
            listener,
            service,
            shutdown_grace,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "MCP server listening");
        }

        let cancel = CancellationToken::new();
        let mut connections: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = Arc::clone(&service);
                        let cancel = cancel.child_token();
                        connections.spawn(async move {
                            let sent = handle_connection(stream, service, cancel).await;
                            debug!(%peer, sent, "Connection finished");
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }

            while connections.try_join_next().is_some() {}
        }

        drop(listener);
        info!(open = connections.len(), "MCP server stopped accepting connections");
        drain(connections, cancel, shutdown_grace).await;
        info!("MCP server shut down");
    }
}

async fn drain(mut connections: JoinSet<()>, cancel: CancellationToken, grace: Duration) {
    if wait_all(&mut connections, grace).await {
        return;
    }

    warn!(
        open = connections.len(),
        "Connections still open after grace period, notifying clients"
    );
    cancel.cancel();

    if !wait_all(&mut connections, NOTIFY_WINDOW).await {
        warn!(open = connections.len(), "Forcibly closing connections");
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}

/// Returns `true` when every task finished within `limit`.
async fn wait_all(connections: &mut JoinSet<()>, limit: Duration) -> bool {
    tokio::time::timeout(limit, async {
        while connections.join_next().await.is_some() {}
    })
    .await
    .is_ok()
}

/// Serve one connection and return the number of results written.
///
/// When `cancel` fires the peer gets a shutting-down error instead of the
/// rest of its results.
pub async fn handle_connection(
    stream: TcpStream,
    service: Arc<dyn SearchService>,
    cancel: CancellationToken,
) -> usize {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(%peer, "Client connected");

    let (read, write) = stream.into_split();
    let mut reader = FramedRead::new(read, JsonRpcCodec::new());
    let mut writer = FramedWrite::new(write, JsonRpcCodec::new());
    let mut sent = 0;

    let served = tokio::select! {
        outcome = serve_request(&mut reader, &mut writer, service.as_ref(), &mut sent) => Some(outcome),
        _ = cancel.cancelled() => None,
    };

    match served {
        Some(Ok(())) => {}
        Some(Err(e)) if e.is_io() => info!(%peer, error = %e, "Connection closed by client"),
        Some(Err(e)) => error!(%peer, error = %e, "Failed to serve request"),
        None => {
            let notice = Message::error(SERVER_SHUTTING_DOWN, "Server shutting down", None);
            if let Err(e) = writer.send(notice).await {
                debug!(%peer, error = %e, "Could not notify client of shutdown");
            }
        }
    }

    if let Err(e) = writer.close().await {
        debug!(%peer, error = %e, "Error closing connection");
    }
    sent
}

async fn serve_request<R, W>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
    service: &dyn SearchService,
    sent: &mut usize,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = match reader.next().await {
        None => {
            debug!("Client closed before sending a request");
            return Ok(());
        }
        Some(Err(e)) if e.is_io() => return Err(e),
        Some(Err(e)) => {
            warn!(error = %e, "Rejected request frame");
            return writer.send(Message::error(e.code(), e.to_string(), None)).await;
        }
        Some(Ok(request)) => request,
    };
    let id = request.id;

    let method = request.method.unwrap_or_default();
    if method != SEARCH_METHOD {
        let message = format!("Method not found: {method}");
        return writer.send(Message::error(METHOD_NOT_FOUND, message, id)).await;
    }

    let query = match from_rpc_params(request.params.as_ref()) {
        Ok(query) => query,
        Err(HighlightError::Validation(message)) => {
            return writer.send(Message::error(INVALID_PARAMS, message, id)).await;
        }
        Err(e) => {
            return writer
                .send(Message::error(INVALID_PARAMS, e.to_string(), id))
                .await;
        }
    };
    info!(q = %query.q, k = query.k, "Search request");

    let mut results = match service.search_stream(query).await {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Search failed");
            return writer
                .send(Message::error(INTERNAL_ERROR, "Internal error", id))
                .await;
        }
    };

    while let Some(item) = results.next().await {
        let result = match item {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, sent = *sent, "Search failed mid-stream");
                return writer
                    .send(Message::error(INTERNAL_ERROR, "Internal error", id))
                    .await;
            }
        };

        if peer_closed(reader) {
            info!(sent = *sent, "Client disconnected during streaming");
            return Ok(());
        }

        let value = serde_json::to_value(&result).map_err(FrameError::Serialize)?;
        writer.send(Message::response(value, id.clone())).await?;
        *sent += 1;
    }

    if *sent == 0 {
        writer.send(Message::response(json!([]), id)).await?;
    }
    Ok(())
}

/// Non-blocking check for EOF or a reset on the read half.
///
/// Anything the client sends after its request is ignored.
fn peer_closed<R: AsyncRead + Unpin>(reader: &mut Reader<R>) -> bool {
    match reader.next().now_or_never() {
        None => false,
        Some(None) => true,
        Some(Some(Err(e))) => e.is_io(),
        Some(Some(Ok(_))) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain_highlights::{HighlightResult, ResultStream, SearchQuery, SearchResult};
    use futures::stream;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::Notify;

    fn result(id: i64) -> SearchResult {
        SearchResult {
            id,
            text: format!("highlight {id}"),
            source_type: Some("book".to_string()),
            source_id: None,
            title: None,
            author: None,
            url: None,
            tags: None,
            highlighted_at: None,
            updated_at: None,
            embedding: None,
            score: id as f64 / 10.0,
        }
    }

    /// Yields the first result at once and the rest after `gate` fires
    struct StubSearch {
        results: Vec<SearchResult>,
        gate: Option<Arc<Notify>>,
        pulled: Arc<Mutex<usize>>,
        seen: Mutex<Vec<SearchQuery>>,
    }

    impl StubSearch {
        fn new(results: Vec<SearchResult>) -> Self {
            Self {
                results,
                gate: None,
                pulled: Arc::new(Mutex::new(0)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn gated(results: Vec<SearchResult>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(results)
            }
        }
    }

    #[async_trait]
    impl SearchService for StubSearch {
        async fn search_stream(&self, query: SearchQuery) -> HighlightResult<ResultStream> {
            self.seen.lock().unwrap().push(query);
            let gate = self.gate.clone();
            let pulled = Arc::clone(&self.pulled);
            let items = self.results.clone().into_iter().enumerate();

            Ok(stream::iter(items)
                .then(move |(i, r)| {
                    let gate = gate.clone();
                    let pulled = Arc::clone(&pulled);
                    async move {
                        if i > 0 {
                            if let Some(gate) = gate {
                                gate.notified().await;
                            }
                        }
                        *pulled.lock().unwrap() += 1;
                        Ok::<_, HighlightError>(r)
                    }
                })
                .boxed())
        }

        async fn ping(&self) -> HighlightResult<()> {
            Ok(())
        }
    }

    /// Never produces a result
    struct HangingSearch;

    #[async_trait]
    impl SearchService for HangingSearch {
        async fn search_stream(&self, _query: SearchQuery) -> HighlightResult<ResultStream> {
            Ok(stream::pending().boxed())
        }

        async fn ping(&self) -> HighlightResult<()> {
            Ok(())
        }
    }

    async fn start(service: Arc<dyn SearchService>) -> (SocketAddr, tokio::task::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(stream, service, CancellationToken::new()).await
        });
        (addr, handle)
    }

    /// Send one line and read every response line until the server closes
    async fn exchange(addr: SocketAddr, line: &str) -> Vec<Value> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(line.as_bytes()).await.unwrap();
        write.write_all(b"\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_streams_each_result_with_request_id() {
        let service = Arc::new(StubSearch::new(vec![result(1), result(2)]));
        let (addr, handle) = start(service.clone()).await;

        let responses = exchange(
            addr,
            r#"{"jsonrpc":"2.0","method":"search","params":{"q":"rust","k":2,"tags":["a"]},"id":"abc"}"#,
        )
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], "abc");
        assert_eq!(responses[0]["result"]["id"], 1);
        assert_eq!(responses[1]["result"]["id"], 2);
        assert!(responses[0].get("error").is_none());
        assert_eq!(handle.await.unwrap(), 2);

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen[0].q, "rust");
        assert_eq!(seen[0].k, 2);
        assert_eq!(seen[0].tags, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn test_no_results_sends_empty_array() {
        let (addr, handle) = start(Arc::new(StubSearch::new(vec![]))).await;

        let responses = exchange(
            addr,
            r#"{"jsonrpc":"2.0","method":"search","params":{"q":"nothing"},"id":1}"#,
        )
        .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["result"], json!([]));
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid_params() {
        let service = Arc::new(StubSearch::new(vec![result(1)]));
        let (addr, _handle) = start(service.clone()).await;

        let responses = exchange(
            addr,
            r#"{"jsonrpc":"2.0","method":"search","params":{"k":3},"id":9}"#,
        )
        .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], INVALID_PARAMS);
        assert_eq!(
            responses[0]["error"]["message"],
            domain_highlights::INVALID_QUERY
        );
        assert_eq!(responses[0]["id"], 9);
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (addr, _handle) = start(Arc::new(StubSearch::new(vec![]))).await;

        let responses = exchange(addr, r#"{"jsonrpc":"2.0","method":"index","id":1}"#).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_frames() {
        for (line, code) in [
            ("{oops", crate::framing::PARSE_ERROR),
            ("42", crate::framing::INVALID_REQUEST),
            (
                r#"{"jsonrpc":"1.0","method":"search"}"#,
                crate::framing::INVALID_REQUEST,
            ),
        ] {
            let (addr, _handle) = start(Arc::new(StubSearch::new(vec![]))).await;
            let responses = exchange(addr, line).await;

            assert_eq!(responses.len(), 1, "{line}");
            assert_eq!(responses[0]["error"]["code"], code, "{line}");
            assert!(responses[0].get("id").is_none());
        }
    }

    #[tokio::test]
    async fn test_stops_streaming_after_client_disconnects() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(StubSearch::gated(
            vec![result(1), result(2), result(3)],
            gate.clone(),
        ));
        let pulled = Arc::clone(&service.pulled);
        let (addr, handle) = start(service).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"search\",\"params\":{\"q\":\"x\"},\"id\":1}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["result"]["id"], 1);

        drop(lines);
        drop(write);
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.notify_waiters();

        let sent = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, 1);
        assert!(*pulled.lock().unwrap() <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_open_connections() {
        let server = McpServer::bind("127.0.0.1:0", Arc::new(HangingSearch))
            .await
            .unwrap()
            .with_shutdown_grace(Duration::from_millis(100));
        let addr = server.local_addr().unwrap();

        let stop = Arc::new(Notify::new());
        let server = tokio::spawn({
            let stop = stop.clone();
            async move { server.run(async move { stop.notified().await }).await }
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"search\",\"params\":{\"q\":\"x\"},\"id\":1}\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.notify_one();

        let mut lines = BufReader::new(read).lines();
        let notice: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(notice["error"]["code"], SERVER_SHUTTING_DOWN);
        assert_eq!(notice["error"]["message"], "Server shutting down");
        assert!(lines.next_line().await.unwrap().is_none());

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_server_shuts_down_immediately() {
        let server = McpServer::bind("127.0.0.1:0", Arc::new(HangingSearch))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), server.run(async {}))
            .await
            .unwrap();
    }
}
