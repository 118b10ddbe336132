use crate::common::{free_port, init_msg, Engine};
use dbgp::transport::Transport;
use dbgp::{Client, Connection, ConnectionConfig, ConnectionState, Error};
use serial_test::serial;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

fn listen_config(port: u16) -> ConnectionConfig {
    ConnectionConfig::listen("127.0.0.1", port).with_timeout(Duration::from_secs(5))
}

#[test]
#[serial]
fn test_accept_timeout() {
    let port = free_port();
    let timeout = Duration::from_millis(200);
    let mut conn = Connection::new(ConnectionConfig::listen("127.0.0.1", port).with_timeout(timeout));
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    let start = Instant::now();
    let err = conn.open().unwrap_err();
    assert!(matches!(err, Error::ConnectionTimeout(_)));
    assert!(start.elapsed() >= timeout);
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.is_connected());

    // listener is released, the port can be bound again
    TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[test]
#[serial]
fn test_accept_and_exchange() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send("<first/>");
        assert_eq!(engine.recv_command().as_deref(), Some("status -i 1"));
        engine.send("");
        engine.send(&"x".repeat(100_000));
    });

    let mut conn = Connection::new(listen_config(port));
    conn.open().unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    // opening again is a no-op
    conn.open().unwrap();

    assert_eq!(conn.recv_msg().unwrap(), "<first/>");
    conn.send_msg("status -i 1").unwrap();
    assert_eq!(conn.recv_msg().unwrap(), "");
    assert_eq!(conn.recv_msg().unwrap().len(), 100_000);

    engine.join().unwrap();
    conn.close();
    conn.close();
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(conn.recv_msg(), Err(Error::NotConnected)));
    assert!(matches!(conn.send_msg("run -i 2"), Err(Error::NotConnected)));
}

#[test]
#[serial]
fn test_connect_mode() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::accept(&listener);
        engine.send(&init_msg("php"));
        engine.reply(r#"status="break" reason="ok""#, "");
    });

    let conn = Connection::new(ConnectionConfig::connect("127.0.0.1", port));
    let mut client = Client::new(conn).unwrap();
    assert_eq!(client.step_into().unwrap().status().unwrap(), "break");
    engine.join().unwrap();
}

#[test]
#[serial]
fn test_peer_closed() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("php"));
        engine.recv_command();
        // half a message, then the engine goes away
        engine.send_raw(b"120\0<response");
    });

    let mut client = Client::new(Connection::new(listen_config(port))).unwrap();
    let err = client.run().unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(err.is_connection_lost());
    assert!(!client.is_connected());
    assert_eq!(client.transport().state(), ConnectionState::Closed);
    engine.join().unwrap();
}

#[test]
#[serial]
fn test_malformed_length() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("php"));
        engine.recv_command();
        engine.send_raw(b"12a\0<response/>\0");
    });

    let mut client = Client::new(Connection::new(listen_config(port))).unwrap();
    let err = client.status().unwrap_err();
    assert!(matches!(err, Error::MalformedLength(_)));
    assert!(!client.is_connected());
    engine.join().unwrap();
}

#[test]
#[serial]
fn test_handshake_failure_closes() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(r#"<init xmlns="urn:debugger_protocol_v1" idekey="x"/>"#);
        // client hangs up after the bad init message
        assert_eq!(engine.recv_command(), None);
    });

    let err = Client::new(Connection::new(listen_config(port))).err().unwrap();
    assert!(err.is_response_format());
    engine.join().unwrap();
}

#[test]
#[serial]
fn test_invalid_utf8_payload() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("php"));
        engine.recv_command();
        engine.send_raw(b"4\0\xff\xfe\xfd\xfc\0");
    });

    let mut client = Client::new(Connection::new(listen_config(port))).unwrap();
    let err = client.status().unwrap_err();
    assert!(matches!(err, Error::FromUtf8(_)));
    assert!(err.is_connection_lost());
    assert!(!client.is_connected());
    assert_eq!(client.transport().state(), ConnectionState::Closed);
    engine.join().unwrap();
}
