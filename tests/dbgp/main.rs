
mod connection;
mod session;

use crate::common::{free_port, init_msg, Engine};
use dbgp::{Client, Connection, ConnectionConfig, Language};
use serial_test::serial;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn test_status_after_handshake() {
    let port = free_port();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("python"));
        engine.reply(r#"status="starting" reason="ok""#, "");
    });

    let conn = Connection::new(
        ConnectionConfig::listen("127.0.0.1", port).with_timeout(Duration::from_secs(5)),
    );
    let mut client = Client::new(conn).unwrap();
    assert_eq!(client.init().language, "python");
    assert_eq!(client.language(), &Language::Python);
    assert_eq!(client.init().idekey.as_deref(), Some("dbgp-test"));

    let status = client.status().unwrap();
    assert_eq!(status.status().unwrap(), "starting");
    assert_eq!(status.to_string(), "starting");
    assert_eq!(client.transaction_id(), 1);

    engine.join().unwrap();
}
