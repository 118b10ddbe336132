//! # dbgp
//!
//! Client side of DBGP, the debugger protocol spoken by Xdebug and other
//! script debugger engines.
//!
//! ## Architecture
//!
//! - **Transport**: a single TCP connection, listening for the engine or connecting to it,
//!   exchanging length-prefixed messages
//! - **Response**: lazily parsed XML payload, engine errors are classified on creation
//! - **Property trees**: variables reported by `context_get`, `property_get` and `eval`
//! - **Client**: init handshake, transaction ids, one method per DBGP command
//!
//! ## Example
//!
//! ```no_run
//! use dbgp::{Client, Connection, ConnectionConfig};
//!
//! fn main() -> dbgp::Result<()> {
//!     let conn = Connection::new(ConnectionConfig::listen("127.0.0.1", 9003));
//!     let mut client = Client::new(conn)?;
//!     println!("debugging a {} script", client.init().language);
//!
//!     let status = client.step_into()?;
//!     println!("status: {status}");
//!
//!     for tree in client.context_get(0, 0)?.properties()? {
//!         for (_, var) in tree.iter() {
//!             println!("{} = {}", var.display_name, var.value);
//!         }
//!     }
//!     client.detach()?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod language;
pub mod property;
pub mod response;
pub mod transport;

pub use client::{Client, InitInfo};
pub use config::{Config, ConnectMode, ConnectionConfig};
pub use error::{Error, Result};
pub use language::Language;
pub use property::{Property, PropertyId, PropertyTree};
pub use response::{Response, ResponseKind, StackFrame};
pub use transport::{Connection, ConnectionState, Transport};
