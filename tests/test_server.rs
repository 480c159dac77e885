use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use lantern::files::{FileStore, StaticFiles};
use lantern::http::handler::Handler;
use lantern::http::request::{Request, Version};
use lantern::http::response::Response;
use lantern::server::{PlainTransport, Registry, Server, ServerHandle, ServerOptions};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    handle: ServerHandle,
    registry: Registry,
    task: JoinHandle<anyhow::Result<()>>,
}

fn options() -> ServerOptions {
    ServerOptions {
        poll_interval: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(1),
        ..ServerOptions::default()
    }
}

/// Answers after a fixed delay.
struct Slow(Duration);

impl Handler for Slow {
    fn handle(&self, _request: Request) -> impl Future<Output = Response> + Send {
        let delay = self.0;
        async move {
            tokio::time::sleep(delay).await;
            Response::ok("slow")
        }
    }
}

async fn start<H: Handler>(handler: H) -> Running {
    start_with(handler, options()).await
}

async fn start_with<H: Handler>(handler: H, options: ServerOptions) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::new(PlainTransport::from_listener(listener), handler, options).unwrap();

    Running {
        addr: server.local_addr().unwrap(),
        handle: server.handle(),
        registry: server.registry(),
        task: tokio::spawn(server.run()),
    }
}

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.path().join("about.txt"), "about us").unwrap();
    dir
}

/// Reads one response: the head as text plus a body of Content-Length bytes.
async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let mut chunk = [0u8; 1024];
        let n = timeout(WAIT, stream.read(&mut chunk)).await.unwrap().unwrap();
        assert!(n > 0, "connection closed before the response head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let mut chunk = [0u8; 1024];
        let n = timeout(WAIT, stream.read(&mut chunk)).await.unwrap().unwrap();
        assert!(n > 0, "connection closed before the response body");
        body.extend_from_slice(&chunk[..n]);
    }

    (head, body)
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    let n = timeout(WAIT, stream.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert_eq!(n, 0);
}

async fn wait_for_handling(registry: &Registry, count: usize) {
    timeout(WAIT, async {
        while registry.handling_count().await != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn stop(running: Running) {
    running.handle.stop();
    timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_server_keep_alive_serves_sequential_requests() {
    let dir = site();
    let running = start(StaticFiles::new(FileStore::new(dir.path(), "not_found.html"), false)).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Connection: keep-alive\r\n"));
    assert_eq!(body, b"<h1>home</h1>");

    stream
        .write_all(b"GET /about.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: text/plain"));
    assert_eq!(body, b"about us");

    stop(running).await;
}

#[tokio::test]
async fn test_server_closes_without_keep_alive() {
    let dir = site();
    let running = start(StaticFiles::new(FileStore::new(dir.path(), "not_found.html"), false)).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET /about.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"about us");
    assert_closed(&mut stream).await;

    stop(running).await;
}

#[tokio::test]
async fn test_server_missing_file_is_404() {
    let dir = site();
    fs::write(dir.path().join("not_found.html"), "custom missing page").unwrap();
    let running = start(StaticFiles::new(FileStore::new(dir.path(), "not_found.html"), false)).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET /nothing-here HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert_eq!(body, b"custom missing page");

    stop(running).await;
}

#[tokio::test]
async fn test_server_malformed_request_gets_400_and_close() {
    let running = start(|_: Request| Response::ok("unreachable")).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nbroken header line\r\n\r\n")
        .await
        .unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_closed(&mut stream).await;

    stop(running).await;
}

#[tokio::test]
async fn test_server_closure_handler_and_http_1_0() {
    let running = start(|req: Request| Response::ok(format!("you asked for {}", req.target))).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET /hello%20world HTTP/1.0\r\n\r\n")
        .await
        .unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"you asked for /hello world");
    assert_closed(&mut stream).await;

    stop(running).await;
}

#[tokio::test]
async fn test_server_concurrent_clients() {
    let dir = site();
    let running = start(StaticFiles::new(FileStore::new(dir.path(), "not_found.html"), false)).await;

    let mut clients = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let addr = running.addr;
        clients.spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /about.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            read_response(&mut stream).await.1
        });
    }

    while let Some(body) = clients.join_next().await {
        assert_eq!(body.unwrap(), b"about us");
    }

    stop(running).await;
}

#[tokio::test]
async fn test_server_stop_clears_registry() {
    let dir = site();
    let running = start(StaticFiles::new(FileStore::new(dir.path(), "not_found.html"), false)).await;
    let registry = running.registry.clone();
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    read_response(&mut stream).await;

    assert!(running.handle.is_running());
    let handle = running.handle.clone();
    stop(running).await;

    assert!(!handle.is_running());
    assert!(registry.is_empty().await);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_server_rejects_http_2() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let options = ServerOptions {
        version: Version { major: 2, minor: 0 },
        ..options()
    };

    let result = Server::new(
        PlainTransport::from_listener(listener),
        |_: Request| Response::ok(""),
        options,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_server_stop_closes_listener_before_drain() {
    let running = start_with(
        Slow(Duration::from_millis(800)),
        ServerOptions {
            shutdown_grace: Duration::from_secs(5),
            ..options()
        },
    )
    .await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    wait_for_handling(&running.registry, 1).await;

    running.handle.stop();
    timeout(WAIT, async {
        while TcpStream::connect(running.addr).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!running.task.is_finished());

    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"slow");

    timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_server_idle_keep_alive_connection_times_out() {
    let running = start_with(
        |_: Request| Response::ok("hi"),
        ServerOptions {
            idle_timeout: Duration::from_millis(200),
            ..options()
        },
    )
    .await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    stream
        .write_all(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.contains("Connection: keep-alive\r\n"));

    assert_closed(&mut stream).await;
    assert!(running.registry.is_empty().await);
    assert!(running.handle.is_running());

    stop(running).await;
}

#[tokio::test]
async fn test_server_saturated_pool_answers_503() {
    let running = start_with(
        Slow(Duration::from_millis(500)),
        ServerOptions {
            workers: 1,
            backlog: 0,
            ..options()
        },
    )
    .await;

    let mut first = TcpStream::connect(running.addr).await.unwrap();
    first
        .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    wait_for_handling(&running.registry, 1).await;

    let mut second = TcpStream::connect(running.addr).await.unwrap();
    second
        .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let (head, _) = read_response(&mut second).await;
    assert!(head.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_closed(&mut second).await;

    let (head, body) = read_response(&mut first).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"slow");

    stop(running).await;
}

#[tokio::test]
async fn test_server_connection_cap_defers_accept() {
    let running = start_with(
        |_: Request| Response::ok("hi"),
        ServerOptions {
            max_connections: 1,
            ..options()
        },
    )
    .await;

    let mut first = TcpStream::connect(running.addr).await.unwrap();
    first
        .write_all(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    read_response(&mut first).await;

    // The kernel completes the handshake but the server does not accept yet
    let mut second = TcpStream::connect(running.addr).await.unwrap();
    second
        .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut byte = [0u8; 1];
    assert!(
        timeout(Duration::from_millis(300), second.read(&mut byte))
            .await
            .is_err()
    );

    drop(first);
    let (head, body) = read_response(&mut second).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"hi");

    stop(running).await;
}
