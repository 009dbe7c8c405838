//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and feeds HTTP/1.1 requests to a handler, one task
//! per connection. Connections are persistent unless the client says
//! otherwise, and pipelined requests already in the buffer are served before
//! reading again.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (head plus body) buffered before answering 413.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// A bound HTTP/1.1 listener.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kvcache::cache::InMemoryCache;
/// use kvcache::middleware::Pipeline;
/// use kvcache::server::Server;
/// use kvcache::caching;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(caching::routes(Arc::new(InMemoryCache::new())));
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server
///         .run(move |req| {
///             let pipeline = pipeline.clone();
///             async move { pipeline.handle(req).await }
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds to `addr`. Port `0` picks an ephemeral port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the process is terminated.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, future::pending()).await
    }

    /// Serves requests until `shutdown` resolves, then stops accepting.
    ///
    /// Connections already accepted keep running on their own tasks.
    ///
    /// # Errors
    ///
    /// Currently always `Ok`; accept errors are logged and retried.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);
        info!(address = %self.local_addr, "kvcache listening");

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down listener");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

enum Frame {
    Ready { request: Request, consumed: usize },
    NeedMore,
    Invalid(RequestError),
    /// The declared body would push the request past `MAX_REQUEST_SIZE`.
    TooLarge { declared: usize },
}

// Looks for one complete request (head and declared body) at the front of `buf`.
fn next_frame(buf: &[u8]) -> Frame {
    if buf.is_empty() {
        return Frame::NeedMore;
    }
    match Request::parse(buf) {
        Ok((request, body_offset)) => {
            let declared = request.content_length().unwrap_or(0);
            let consumed = match body_offset.checked_add(declared) {
                Some(total) if total <= MAX_REQUEST_SIZE => total,
                _ => return Frame::TooLarge { declared },
            };
            if buf.len() < consumed {
                Frame::NeedMore
            } else {
                Frame::Ready { request, consumed }
            }
        }
        Err(RequestError::Incomplete) => Frame::NeedMore,
        Err(e) => Frame::Invalid(e),
    }
}

async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        match next_frame(&buf) {
            Frame::Ready { request, consumed } => {
                buf.advance(consumed);
                let keep_alive = request.is_keep_alive();
                debug!(
                    peer = %peer_addr,
                    method = %request.method(),
                    path = %request.path(),
                    "dispatching request"
                );

                let response = handler(request).await.keep_alive(keep_alive);
                stream.write_all(&response.into_bytes()).await?;
                stream.flush().await?;

                if !keep_alive {
                    debug!(peer = %peer_addr, "Connection: close — shutting down");
                    break;
                }
                continue;
            }
            Frame::NeedMore => {}
            Frame::Invalid(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::text(StatusCode::BadRequest, format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
            Frame::TooLarge { declared } => {
                warn!(peer = %peer_addr, declared, "declared body too large — sending 413");
                reject_too_large(&mut stream).await?;
                break;
            }
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            reject_too_large(&mut stream).await?;
            break;
        }

        if stream.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }
    }

    Ok(())
}

async fn reject_too_large(stream: &mut TcpStream) -> Result<(), std::io::Error> {
    let response =
        Response::text(StatusCode::PayloadTooLarge, "Request entity too large").keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_waits_for_declared_body() {
        let raw = b"POST /caching/k HTTP/1.1\r\nContent-Length: 10\r\n\r\nvalue=";
        assert!(matches!(next_frame(raw), Frame::NeedMore));
    }

    #[test]
    fn frame_consumes_exactly_one_request() {
        let raw = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        match next_frame(raw) {
            Frame::Ready { request, consumed } => {
                assert_eq!(request.path(), "/a");
                assert_eq!(&raw[consumed..], b"GET /b HTTP/1.1\r\n\r\n");
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn frame_rejects_garbage() {
        assert!(matches!(next_frame(b"\x00\x01 nonsense\r\n\r\n"), Frame::Invalid(_)));
        assert!(matches!(next_frame(b""), Frame::NeedMore));
    }

    #[test]
    fn frame_rejects_oversized_declared_body() {
        let raw = format!(
            "POST /caching/k HTTP/1.1\r\nContent-Length: {}\r\n\r\nvalue=x",
            MAX_REQUEST_SIZE + 1
        );
        assert!(matches!(
            next_frame(raw.as_bytes()),
            Frame::TooLarge { declared } if declared == MAX_REQUEST_SIZE + 1
        ));
    }

    #[test]
    fn frame_survives_max_content_length() {
        let raw = b"POST /caching/k HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nvalue=x";
        assert!(matches!(next_frame(raw), Frame::TooLarge { .. }));
    }

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let err = match Server::bind("no-port-here").await {
            Err(e) => e,
            Ok(_) => panic!("bind should fail"),
        };
        assert!(matches!(err, ServerError::Bind { ref addr, .. } if addr == "no-port-here"));
    }
}
