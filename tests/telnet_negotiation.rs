//! Wire-level negotiation tests over in-memory pipes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use euphio::nodes::Connection;
use euphio::telnet::consts::{AYT, DO, ECHO, IAC, NAWS, SB, SE, SGA, TTYPE, WILL, WONT};
use euphio::telnet::TelnetConnection;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::{sleep, timeout};

fn peer() -> SocketAddr {
    "127.0.0.1:49152".parse().unwrap()
}

/// Drive the server side of the connection so negotiation replies flow.
fn spawn_reader(conn: Arc<TelnetConnection<DuplexStream>>) {
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            match conn.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    });
}

async fn eventually<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// No further bytes should arrive within the grace window.
async fn assert_no_more_bytes(client: &mut DuplexStream) {
    let mut extra = [0u8; 16];
    let outcome = timeout(Duration::from_millis(200), client.read(&mut extra)).await;
    assert!(outcome.is_err(), "unexpected extra bytes from server");
}

#[tokio::test]
async fn do_echo_answered_with_will_echo_exactly_once() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));
    spawn_reader(conn.clone());

    // Two identical requests; loop suppression means one reply.
    client.write_all(&[IAC, DO, ECHO]).await.unwrap();
    client.write_all(&[IAC, DO, ECHO]).await.unwrap();

    eventually(|| conn.is_local_option_enabled(ECHO), "echo enabled").await;

    let mut reply = [0u8; 16];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(&reply[..n], &[IAC, WILL, ECHO]);
    assert_no_more_bytes(&mut client).await;
}

#[tokio::test]
async fn naws_subnegotiation_updates_dimensions() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));
    conn.enable_remote_option(NAWS);
    spawn_reader(conn.clone());

    client
        .write_all(&[IAC, SB, NAWS, 0x00, 0x50, 0x00, 0x18, IAC, SE])
        .await
        .unwrap();

    eventually(|| conn.terminal_info().width == 80, "width update").await;
    let info = conn.terminal_info();
    assert_eq!(info.width, 80);
    assert_eq!(info.height, 24);
}

#[tokio::test]
async fn ayt_gets_literal_yes_reply() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));
    spawn_reader(conn);

    client.write_all(&[IAC, AYT]).await.unwrap();

    let expected = b"\r\n[Yes]\r\n";
    let mut reply = vec![0u8; expected.len()];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, expected);
}

#[tokio::test]
async fn terminal_type_reply_is_recorded() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));
    spawn_reader(conn.clone());

    // Peer offers TTYPE; server should accept and ask for the name.
    client.write_all(&[IAC, WILL, TTYPE]).await.unwrap();

    let mut reply = [0u8; 16];
    let mut got = Vec::new();
    while got.len() < 9 {
        let n = client.read(&mut reply).await.unwrap();
        got.extend_from_slice(&reply[..n]);
    }
    // DO TTYPE followed by SB TTYPE SEND IAC SE.
    assert_eq!(
        got,
        vec![IAC, DO, TTYPE, IAC, SB, TTYPE, 0x01, IAC, SE]
    );

    // IS "ansi"
    client
        .write_all(&[IAC, SB, TTYPE, 0x00, b'a', b'n', b's', b'i', IAC, SE])
        .await
        .unwrap();
    eventually(|| conn.terminal_info().term_type == "ansi", "ttype update").await;
}

#[tokio::test]
async fn proactive_negotiation_bytes() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));

    conn.begin_negotiation().await.unwrap();

    let expected = [
        IAC, WILL, ECHO, IAC, WILL, SGA, IAC, DO, NAWS, IAC, DO, TTYPE,
    ];
    let mut got = vec![0u8; expected.len()];
    client.read_exact(&mut got).await.unwrap();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn send_will_is_loop_suppressed() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));

    conn.send_will(ECHO).await.unwrap();
    conn.send_will(ECHO).await.unwrap();

    let mut reply = [0u8; 16];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(&reply[..n], &[IAC, WILL, ECHO]);
    assert_no_more_bytes(&mut client).await;

    // WONT clears the flag, so a later WILL goes out again.
    conn.send_wont(ECHO).await.unwrap();
    conn.send_will(ECHO).await.unwrap();
    let mut replies = vec![0u8; 6];
    client.read_exact(&mut replies).await.unwrap();
    assert_eq!(replies, vec![IAC, WONT, ECHO, IAC, WILL, ECHO]);
}

#[tokio::test]
async fn escaped_user_data_round_trips() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));

    // Peer sends data with an escaped 0xFF in the middle.
    client
        .write_all(&[b'a', IAC, IAC, b'b'])
        .await
        .unwrap();

    let mut buf = [0u8; 16];
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &[b'a', 0xFF, b'b']);

    // And the server escapes its own writes the same way.
    conn.write(&[b'x', 0xFF, b'y']).await.unwrap();
    let mut out = vec![0u8; 4];
    client.read_exact(&mut out).await.unwrap();
    assert_eq!(out, vec![b'x', IAC, IAC, b'y']);
}

#[tokio::test]
async fn refused_option_gets_wont() {
    let (server_io, mut client) = duplex(1024);
    let conn = Arc::new(TelnetConnection::new(server_io, peer()));
    spawn_reader(conn);

    // Linemode (34) is outside the accepted set.
    client.write_all(&[IAC, DO, 34]).await.unwrap();

    let mut reply = [0u8; 16];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(&reply[..n], &[IAC, WONT, 34]);
}
