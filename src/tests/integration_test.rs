use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::client::{LockRef, MessageClient};
use crate::message::{Message, MessageEnvelope};
use crate::testing::session;
use crate::transport::{ReqwestTransport, Transport};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

/// Answers one canned response per connection and hands back the raw
/// requests it saw.
fn serve(listener: TcpListener, responses: Vec<String>) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            seen.push(read_request(&mut socket).await);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
        seen
    })
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        raw.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + content_length {
                return text;
            }
        }
        if n == 0 {
            return String::from_utf8_lossy(&raw).to_string();
        }
    }
}

fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    out
}

#[tokio::test]
async fn integration_send_then_peek_lock_over_http() {
    let (listener, base) = bind().await;
    let lock_token = "4fc3b24e-3a3c-4f4a-9b5e-6c8e3f7d2a10";
    let location = format!("{base}/orders/messages/7/{lock_token}");
    let broker_properties = format!(
        r#"{{"DeliveryCount":1,"LockToken":"{lock_token}","MessageId":"1","Label":"M1","SequenceNumber":7}}"#
    );
    let server = serve(
        listener,
        vec![
            http_response("201 Created", &[], ""),
            http_response(
                "201 Created",
                &[
                    ("BrokerProperties", broker_properties.as_str()),
                    ("Location", location.as_str()),
                    ("Priority", "\"High\""),
                    ("Content-Type", "application/atom+xml;type=entry;charset=utf-8"),
                ],
                "This is message #1",
            ),
            http_response("200 OK", &[], ""),
        ],
    );

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(false).unwrap());
    let client = MessageClient::new(session(transport).await);
    let address = format!("{base}/orders");
    let timeout = Duration::from_secs(5);

    let outgoing = Message::new("This is message #1")
        .with_envelope(MessageEnvelope::new().with_label("M1").with_message_id("1"))
        .with_property("Priority", "High");
    client.send(&address, &outgoing, timeout).await.unwrap();

    let received = client
        .receive_locked(&address, timeout)
        .await
        .unwrap()
        .expect("a message should be delivered");
    assert_eq!(received.body_text(), "This is message #1");
    assert_eq!(received.envelope.sequence_number, Some(7));
    assert_eq!(received.properties.get("Priority"), Some("High"));
    assert_eq!(received.location.as_deref(), Some(location.as_str()));

    let lock = received.lock_ref(&address).unwrap();
    assert_eq!(lock, LockRef::Location(location.clone()));
    client.delete_message(&lock, timeout).await.unwrap();

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /orders/messages?timeout=5 HTTP/1.1"));
    let send_lower = requests[0].to_ascii_lowercase();
    assert!(send_lower.contains("authorization: sharedaccesssignature sr="));
    assert!(send_lower.contains("brokerproperties: {\"messageid\":\"1\",\"label\":\"m1\"}"));
    assert!(send_lower.contains("priority: high"));
    assert!(requests[0].ends_with("This is message #1"));

    assert!(requests[1].starts_with("POST /orders/messages/head?timeout=5 HTTP/1.1"));
    assert!(requests[2].starts_with(&format!(
        "DELETE /orders/messages/7/{lock_token}?timeout=5 HTTP/1.1"
    )));
}

#[tokio::test]
async fn integration_empty_queue_yields_none() {
    let (listener, base) = bind().await;
    let server = serve(listener, vec![http_response("204 No Content", &[], "")]);

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(false).unwrap());
    let client = MessageClient::new(session(transport).await);

    let received = client
        .receive_and_delete(&format!("{base}/orders"), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(received.is_none());

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("DELETE /orders/messages/head?timeout=1 HTTP/1.1"));
}

#[tokio::test]
async fn integration_connection_refused_is_transport_error() {
    let (listener, base) = bind().await;
    drop(listener);

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(false).unwrap());
    let client = MessageClient::new(session(transport).await);

    let err = client
        .send(&format!("{base}/orders"), &Message::new("x"), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, crate::utils::error::BusError::Transport(_)));
    assert!(err.is_transient());
}
