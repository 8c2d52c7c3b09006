#![allow(unused)]
//! TCP receiver integration harness.
//!
//! # What this covers
//!
//! - **Independent connections**: each connection has its own parser, so a
//!   quoted field left open on one connection never swallows records from
//!   another.
//! - **Stream framing**: a trailing partial line is held until its newline
//!   arrives, and flushed when the peer closes.
//! - **Termination**: stopping the receiver closes the listener and every
//!   open connection.
//!
//! # Running
//!
//! ```sh
//! cargo test --test tcp_harness
//! ```

mod common;
use common::*;

use logtree_core::sink::VecSink;
use logtree_receivers::tcp::{TcpReceiver, TcpSettings};
use logtree_receivers::Receiver;
use pretty_assertions::assert_eq;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(5);

fn start() -> (TcpReceiver, Arc<VecSink>, SocketAddr) {
    let mut receiver = TcpReceiver::new(TcpSettings {
        port: 0,
        host: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ..TcpSettings::default()
    });
    receiver.initialize().expect("bind");
    let sink = Arc::new(VecSink::new());
    receiver.attach(sink.clone());
    let addr = receiver.local_addr().expect("bound");
    (receiver, sink, addr)
}

#[tokio::test]
async fn connections_do_not_share_parser_state() {
    let (mut receiver, sink, addr) = start();
    let mut a = TcpStream::connect(addr).await.expect("connect a");
    let mut b = TcpStream::connect(addr).await.expect("connect b");

    a.write_all(b"1,t,Error,main,Conn.A,Run,\"opened on a\n").await.expect("write a");
    tokio::time::sleep(Duration::from_millis(100)).await;
    b.write_all(CsvLine::new(2, "Conn.B", "complete on b").render().as_bytes())
        .await
        .expect("write b");

    let events = collect_events(&sink, 1, WAIT).await;
    assert_messages!(events, ["complete on b"]);

    a.write_all(b"closed on a\",,\n").await.expect("write a");
    let events = collect_events(&sink, 1, WAIT).await;
    assert_no_diagnostics!(events);
    assert_messages!(events, ["opened on a\nclosed on a"]);
    assert_eq!(events[0].logger_name, "Conn.A");

    receiver.terminate();
}

#[tokio::test]
async fn partial_line_waits_for_its_newline() {
    let (mut receiver, sink, addr) = start();
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(b"5,t,Info,main,App,Run,half").await.expect("write");
    assert_quiet(&sink, Duration::from_millis(200)).await;

    client.write_all(b" and half,,\n").await.expect("write");
    let events = collect_events(&sink, 1, WAIT).await;
    assert_messages!(events, ["half and half"]);

    receiver.terminate();
}

#[tokio::test]
async fn closing_the_connection_flushes_the_last_record() {
    let (mut receiver, sink, addr) = start();
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(b"7,t,Info,main,App,Run,no newline,,").await.expect("write");
    client.shutdown().await.expect("shutdown");

    let events = collect_events(&sink, 1, WAIT).await;
    assert_messages!(events, ["no newline"]);

    receiver.terminate();
}

#[tokio::test]
async fn many_records_on_one_connection_keep_their_order() {
    let (mut receiver, sink, addr) = start();
    let mut client = TcpStream::connect(addr).await.expect("connect");

    client.write_all(csv_lines(1, 500).as_bytes()).await.expect("write");
    client.shutdown().await.expect("shutdown");

    let events = collect_events(&sink, 500, WAIT).await;
    assert_eq!(events.len(), 500);
    let sequences: Vec<_> = events.iter().filter_map(|e| e.sequence_nr).collect();
    assert_eq!(sequences, (1..=500).collect::<Vec<u64>>());

    receiver.terminate();
}

#[tokio::test]
async fn terminate_closes_open_connections() {
    let (mut receiver, sink, addr) = start();
    let mut client = TcpStream::connect(addr).await.expect("connect");
    client.write_all(csv_lines(1, 1).as_bytes()).await.expect("write");
    collect_events(&sink, 1, WAIT).await;

    receiver.terminate();

    // The server side drops the socket; the client sees EOF (or a reset).
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, client.read(&mut buf)).await.expect("closed in time");
    assert!(matches!(read, Ok(0) | Err(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(TcpStream::connect(addr).await.is_err(), "listener still accepting");
}
