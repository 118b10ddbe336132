//! DBGP protocol client: handshake, transaction ids and the command catalog.

use crate::error::{Error, Result};
use crate::language::Language;
use crate::response::{Response, ResponseKind, EVAL_SEPARATOR};
use crate::transport::Transport;
use base64::Engine as _;
use log::debug;

/// Session metadata announced by the engine in its init message.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct InitInfo {
    /// Lower-cased `language` attribute.
    pub language: String,
    pub idekey: Option<String>,
    /// `api_version`, or `protocol_version` for engines that only send that one.
    pub protocol_version: Option<String>,
    /// URI of the first script file.
    pub fileuri: Option<String>,
}

impl InitInfo {
    /// Parse an init message payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(payload)?;
        let root = doc.root_element();
        let Some(language) = root.attribute("language") else {
            return Err(Error::response_format(
                "invalid init message from debugger engine: missing language",
                payload,
            ));
        };
        let attr = |name: &str| root.attribute(name).map(str::to_string);
        Ok(InitInfo {
            language: language.to_lowercase(),
            idekey: attr("idekey"),
            protocol_version: attr("api_version").or_else(|| attr("protocol_version")),
            fileuri: attr("fileuri"),
        })
    }
}

/// Quote a command argument, escaping backslashes and double quotes.
pub fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Client side of a single debugging session.
///
/// Strictly one command in flight: every command blocks until its response is received.
/// The transport is closed when the client is dropped.
pub struct Client<T: Transport> {
    transport: T,
    transaction_id: u32,
    init: InitInfo,
    language: Language,
}

impl<T: Transport> Client<T> {
    /// Open the transport (if not yet open) and read the engine init message.
    ///
    /// On failure the transport is closed.
    pub fn new(mut transport: T) -> Result<Self> {
        let init = Self::handshake(&mut transport).inspect_err(|_| transport.close())?;
        debug!(target: "dbgp", "session started: {init:?}");
        let language = Language::from_attr(&init.language);
        Ok(Self {
            transport,
            transaction_id: 0,
            init,
            language,
        })
    }

    fn handshake(transport: &mut T) -> Result<InitInfo> {
        if !transport.is_connected() {
            transport.open()?;
        }
        let msg = transport.recv_msg()?;
        debug!(target: "dbgp", "<- {msg}");
        InitInfo::parse(&msg)
    }

    pub fn init(&self) -> &InitInfo {
        &self.init
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Id of the last issued command, 0 before the first one.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Close the connection to the engine. Safe to call more than once.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Send a command and wait for its response.
    ///
    /// The response kind is selected by the command name.
    pub fn send_cmd(&mut self, cmd: &str, args: &str) -> Result<Response> {
        self.send_cmd_as(cmd, args, ResponseKind::for_command(cmd.trim()))
    }

    /// Send a command and wrap the response as the given kind.
    pub fn send_cmd_as(&mut self, cmd: &str, args: &str, kind: ResponseKind) -> Result<Response> {
        let cmd = cmd.trim();
        let args = args.trim();
        self.transaction_id += 1;
        let mut line = format!("{cmd} -i {}", self.transaction_id);
        if !args.is_empty() {
            line.push(' ');
            line.push_str(args);
        }

        debug!(target: "dbgp", "-> {line}");
        self.transport.send_msg(&line)?;
        let msg = self.transport.recv_msg()?;
        debug!(target: "dbgp", "<- {msg}");

        Response::new(msg, cmd, args, kind, self.language.clone())
    }

    pub fn status(&mut self) -> Result<Response> {
        self.send_cmd("status", "")
    }

    pub fn feature_get(&mut self, name: &str) -> Result<Response> {
        self.send_cmd("feature_get", &format!("-n {name}"))
    }

    pub fn feature_set(&mut self, name: &str, value: &str) -> Result<Response> {
        self.send_cmd("feature_set", &format!("-n {name} -v {value}"))
    }

    /// Start or resume the script.
    pub fn run(&mut self) -> Result<Response> {
        self.send_cmd("run", "")
    }

    pub fn step_into(&mut self) -> Result<Response> {
        self.send_cmd("step_into", "")
    }

    pub fn step_over(&mut self) -> Result<Response> {
        self.send_cmd("step_over", "")
    }

    pub fn step_out(&mut self) -> Result<Response> {
        self.send_cmd("step_out", "")
    }

    /// Terminate the script immediately.
    pub fn stop(&mut self) -> Result<Response> {
        self.send_cmd("stop", "")
    }

    pub fn stack_get(&mut self) -> Result<Response> {
        self.send_cmd("stack_get", "")
    }

    /// Variables of a context (see [`Client::context_names`]) at a stack depth.
    pub fn context_get(&mut self, context: i64, depth: u32) -> Result<Response> {
        self.send_cmd("context_get", &format!("-c {context} -d {depth}"))
    }

    pub fn context_names(&mut self) -> Result<Response> {
        self.send_cmd("context_names", "")
    }

    pub fn property_get(&mut self, name: &str) -> Result<Response> {
        self.send_cmd("property_get", &format!("-n {} -d 0", quote_arg(name)))
    }

    /// Evaluate an expression. An invalid expression fails with [`Error::Evaluation`].
    pub fn eval(&mut self, code: &str) -> Result<Response> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(code);
        self.send_cmd("eval", &format!("{EVAL_SEPARATOR}{encoded}"))
    }

    /// Detach from the engine and close the connection, the script keeps running.
    pub fn detach(&mut self) -> Result<Response> {
        let result = self.send_cmd("detach", "");
        self.close();
        result
    }

    /// Set a breakpoint, `args` are passed as is (e.g. `-t line -f file:///a.php -n 10`).
    pub fn breakpoint_set(&mut self, args: &str) -> Result<Response> {
        self.send_cmd("breakpoint_set", args)
    }

    pub fn breakpoint_list(&mut self) -> Result<Response> {
        self.send_cmd("breakpoint_list", "")
    }

    pub fn breakpoint_enable(&mut self, id: u64) -> Result<Response> {
        self.send_cmd("breakpoint_update", &format!("-d {id} -s enabled"))
    }

    pub fn breakpoint_disable(&mut self, id: u64) -> Result<Response> {
        self.send_cmd("breakpoint_update", &format!("-d {id} -s disabled"))
    }

    pub fn breakpoint_remove(&mut self, id: u64) -> Result<Response> {
        self.send_cmd("breakpoint_remove", &format!("-d {id}"))
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
