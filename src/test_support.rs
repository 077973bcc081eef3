//! Minimal HTTP/1.1 responder for exercising the HTTP code paths in tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A canned response for one request path (`"*"` matches any path).
pub struct Route {
    pub path: &'static str,
    pub status: u16,
    pub body: Vec<u8>,
    /// Send the body in pieces of this size with a pause after each, and
    /// without a `Content-Length` header.
    pub trickle: Option<(usize, Duration)>,
}

impl Route {
    pub fn ok(path: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            status: 200,
            body: body.into(),
            trickle: None,
        }
    }

    pub fn trickle(
        path: &'static str,
        body: impl Into<Vec<u8>>,
        chunk: usize,
        pause: Duration,
    ) -> Self {
        Self {
            trickle: Some((chunk.max(1), pause)),
            ..Self::ok(path, body)
        }
    }

    pub fn status(path: &'static str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            status,
            body: body.into(),
            trickle: None,
        }
    }
}

/// Serve `routes` on an ephemeral local port and return `http://127.0.0.1:<port>`.
pub async fn serve(routes: Vec<Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let read = socket.read(&mut buf).await.unwrap_or(0);
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..read]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let (status, body, trickle) = routes
                    .iter()
                    .find(|route| route.path == path || route.path == "*")
                    .map(|route| (route.status, route.body.clone(), route.trickle))
                    .unwrap_or((404, b"not found".to_vec(), None));
                let reason = if status < 400 { "OK" } else { "Error" };
                match trickle {
                    None => {
                        let head = format!(
                            "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                    }
                    Some((chunk, pause)) => {
                        let head =
                            format!("HTTP/1.1 {status} {reason}\r\nConnection: close\r\n\r\n");
                        let _ = socket.write_all(head.as_bytes()).await;
                        for piece in body.chunks(chunk) {
                            let _ = socket.write_all(piece).await;
                            let _ = socket.flush().await;
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// Serve one canned response on every path; returns a URL to fetch it from.
pub async fn serve_once(status: u16, body: Vec<u8>) -> String {
    let base = serve(vec![Route::status("*", status, body)]).await;
    format!("{base}/manifest.json")
}
