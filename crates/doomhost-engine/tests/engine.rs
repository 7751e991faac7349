//! Integration tests for the query and RCON clients against a fake engine
//! that speaks Huffman-wrapped UDP on loopback.

use std::net::SocketAddr;
use std::time::Duration;

use doomhost_engine::query::{self, QueryFlags, REPLY_MAGIC};
use doomhost_engine::rcon::{self, RconClient};
use doomhost_engine::{QueryError, RconError};
use doomhost_protocol::{ByteBuffer, Endian, huffman};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

// =========================================================================
// Fake engine
// =========================================================================

const SALT: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

/// Binds a fake engine and hands every decoded datagram to `respond`.
/// Whatever `respond` returns is sent back, Huffman-encoded. Received
/// payloads are also forwarded on the returned channel.
async fn fake_engine<F>(mut respond: F) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>)
where
    F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = socket.local_addr().expect("addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let payload = huffman::decode(&buf[..n]).expect("client sent valid huffman");
            let _ = tx.send(payload.clone());
            if let Some(reply) = respond(&payload) {
                let _ = socket.send_to(&huffman::encode(&reply), from).await;
            }
        }
    });

    (addr, rx)
}

/// An RCON server with password "hunter2".
fn rcon_responder(payload: &[u8]) -> Option<Vec<u8>> {
    match payload.first() {
        Some(52) => {
            assert_eq!(payload, &[52, 3]);
            let mut reply = vec![34];
            reply.extend_from_slice(SALT);
            reply.push(0);
            Some(reply)
        }
        Some(53) => {
            let expected = rcon::login_token(SALT, "hunter2");
            if &payload[1..] == expected.as_bytes() {
                Some(vec![35])
            } else {
                Some(vec![36])
            }
        }
        _ => None,
    }
}

// =========================================================================
// Query
// =========================================================================

#[tokio::test]
async fn test_query_parses_reply_from_engine() {
    let (addr, mut seen) = fake_engine(|payload| {
        assert_eq!(&payload[..4], &199u32.to_le_bytes());
        let mut buf = ByteBuffer::new(Endian::Little);
        buf.put_i32(REPLY_MAGIC);
        buf.put_i32(1);
        buf.put_string("3.1", true);
        buf.put_u32((QueryFlags::NAME | QueryFlags::NUMPLAYERS).bits());
        buf.put_string("Fake Server", true);
        buf.put_u8(0);
        Some(buf.get_all_bytes())
    })
    .await;

    let info = query::query(addr, QueryFlags::NAME | QueryFlags::NUMPLAYERS)
        .await
        .expect("query")
        .expect("server info");
    assert_eq!(info.name.as_deref(), Some("Fake Server"));
    assert_eq!(info.num_players, Some(0));

    let request = seen.recv().await.expect("request seen");
    assert_eq!(request.len(), 12);
    assert_eq!(&request[4..8], &0x80001u32.to_le_bytes());
}

#[tokio::test]
async fn test_query_wrong_magic_is_no_response() {
    let (addr, _seen) = fake_engine(|_| Some(vec![0, 0, 0, 0, 0, 0, 0, 0])).await;
    let result = query::query(addr, QueryFlags::default()).await.expect("query");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_query_silent_server_times_out() {
    let (addr, _seen) = fake_engine(|_| None).await;
    let err = query::query_with_timeout(addr, QueryFlags::default(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Timeout(_)));
}

// =========================================================================
// RCON
// =========================================================================

#[tokio::test]
async fn test_rcon_login_and_command() {
    let (addr, mut seen) = fake_engine(rcon_responder).await;

    rcon::send_command(addr, "hunter2", "map MAP02")
        .await
        .expect("rcon should succeed");

    assert_eq!(seen.recv().await.expect("begin"), vec![52, 3]);
    let login = seen.recv().await.expect("password");
    assert_eq!(login[0], 53);
    assert_eq!(login.len(), 33);
    let command = seen.recv().await.expect("command");
    assert_eq!(command[0], 54);
    assert_eq!(&command[1..], b"map MAP02");
}

#[tokio::test]
async fn test_rcon_wrong_password_is_rejected() {
    let (addr, _seen) = fake_engine(rcon_responder).await;
    let err = rcon::send_command(addr, "wrong", "quit").await.unwrap_err();
    assert!(matches!(err, RconError::InvalidPassword));
}

#[tokio::test]
async fn test_rcon_banned_before_salt() {
    let (addr, _seen) = fake_engine(|_| Some(vec![33])).await;
    let err = rcon::send_command(addr, "hunter2", "quit").await.unwrap_err();
    assert!(matches!(err, RconError::Banned));
}

#[tokio::test]
async fn test_rcon_old_protocol() {
    let (addr, _seen) = fake_engine(|_| Some(vec![32])).await;
    let err = rcon::send_command(addr, "hunter2", "quit").await.unwrap_err();
    assert!(matches!(err, RconError::OldProtocol));
}

#[tokio::test]
async fn test_rcon_short_salt_is_malformed() {
    let (addr, _seen) = fake_engine(|_| Some(vec![34, b'a', b'b'])).await;
    let err = rcon::send_command(addr, "hunter2", "quit").await.unwrap_err();
    assert!(matches!(err, RconError::MalformedSalt(2)));
}

#[tokio::test]
async fn test_rcon_timeout_without_reply() {
    let (addr, _seen) = fake_engine(|_| None).await;
    let client = RconClient::connect(addr)
        .await
        .expect("connect")
        .with_timeout(Duration::from_millis(100));
    let err = client.login("hunter2").await.unwrap_err();
    assert!(matches!(err, RconError::Timeout(_)));
}
