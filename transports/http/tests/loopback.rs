use bytes::Bytes;
use filebin_core::{Transport, TransportRequest};
use filebin_transport_http::{HttpTransport, HttpTransportConfig};
use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one HTTP/1.1 response with `content_type` and `body`, returning the
/// base URL to reach it.
async fn serve_once(content_type: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

fn transport(base_url: &str) -> HttpTransport {
    HttpTransport::create(HttpTransportConfig::new(base_url)).unwrap()
}

#[tokio::test]
async fn json_typed_download_keeps_its_exact_bytes() {
    const FILE: &[u8] = b"{\n  \"zeta\": 1,\n  \"alpha\": 2.50\n}\n";
    let base = serve_once("application/json", FILE).await;

    let response = transport(&base)
        .send(TransportRequest::get(["abc123", "data.json"]))
        .await
        .unwrap();
    assert!(response.is_success());

    let chunks: Vec<Bytes> = response.into_stream().try_collect().await.unwrap();
    assert_eq!(chunks.concat(), FILE);
}

#[tokio::test]
async fn metadata_is_parsed_on_request() {
    let body = b"{\"bin\": {\"id\": \"abc123\"}}";
    let base = serve_once("application/json; charset=utf-8", body).await;

    let response = transport(&base)
        .send(TransportRequest::get(["abc123"]).accept_json())
        .await
        .unwrap();
    let json = response.json().await.unwrap();
    assert_eq!(json["bin"]["id"], "abc123");
}
