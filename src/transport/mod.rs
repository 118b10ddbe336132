//! Byte-stream transport for DBGP messages.
//! Supports listening for a single inbound engine connection and connecting to a listening engine.

pub mod frame;

use crate::config::{ConnectMode, ConnectionConfig};
use crate::error::{Error, Result};
use log::{debug, info};
use std::io::{BufReader, ErrorKind};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Trait for DBGP message transport.
///
/// Exactly one message is exchanged per call; partial reads and writes are hidden.
pub trait Transport {
    /// Establish the connection, a no-op if already connected.
    fn open(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Send a single command line.
    fn send_msg(&mut self, msg: &str) -> Result<()>;

    /// Block until a single message from the engine is received.
    fn recv_msg(&mut self) -> Result<String>;

    /// Release the connection. Safe to call any number of times.
    fn close(&mut self);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectionState {
    Disconnected,
    Listening,
    Connected,
    Closed,
}

struct Stream {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

/// TCP connection to a debugger engine.
pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    stream: Option<Stream>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            stream: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Wait for a single inbound connection. The listener is dropped on every outcome.
    fn accept(&mut self) -> Result<TcpStream> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr)?;
        listener.set_nonblocking(true)?;
        self.state = ConnectionState::Listening;
        info!(target: "dbgp", "waiting for a debugger engine on {addr} ({:?})", self.config.timeout);

        let deadline = Instant::now() + self.config.timeout;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!(target: "dbgp", "debugger engine connected from {peer}");
                    stream.set_nonblocking(false)?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::ConnectionTimeout(self.config.timeout));
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn connect(&mut self) -> Result<TcpStream> {
        let addr = self.config.address();
        let mut last_err = None;
        for sock_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sock_addr, self.config.timeout) {
                Ok(stream) => {
                    info!(target: "dbgp", "connected to debugger engine at {sock_addr}");
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_err = Some(Error::ConnectionTimeout(self.config.timeout))
                }
                Err(e) => last_err = Some(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::IO(std::io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("no address resolved for {addr}"),
            ))
        }))
    }

    fn establish(&mut self) -> Result<()> {
        let stream = match self.config.mode {
            ConnectMode::Listen => self.accept()?,
            ConnectMode::Connect => self.connect()?,
        };
        // from here reads block until the engine answers or goes away
        stream.set_read_timeout(None)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        self.stream = Some(Stream {
            writer: stream,
            reader,
        });
        self.state = ConnectionState::Connected;
        Ok(())
    }
}

impl Transport for Connection {
    fn open(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.establish().inspect_err(|_| self.close())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.stream.is_some()
    }

    fn send_msg(&mut self, msg: &str) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        frame::write_command(&mut stream.writer, msg).inspect_err(|_| self.close())
    }

    fn recv_msg(&mut self) -> Result<String> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        let result = frame::read_message(&mut stream.reader)
            .and_then(|body| String::from_utf8(body).map_err(Error::from));
        if result.is_err() {
            self.close();
        }
        result
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(target: "dbgp", "closing connection to debugger engine");
            _ = stream.writer.shutdown(Shutdown::Both);
        }
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Closed;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
