use std::string::FromUtf8Error;
use std::time::Duration;

/// Error code a debugger engine reports for an unimplemented command.
pub const CODE_NOT_IMPLEMENTED: i32 = 4;
/// Error code a debugger engine reports for an expression it can't evaluate.
pub const CODE_INVALID_EXPRESSION: i32 = 206;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- connection errors -----------------------------------------
    #[error("no connection from debugger engine within {0:?}")]
    ConnectionTimeout(Duration),
    #[error("connection closed by debugger engine")]
    ConnectionClosed,
    #[error("not connected to a debugger engine")]
    NotConnected,
    #[error("malformed message length: {0}")]
    MalformedLength(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- response format errors ------------------------------------
    #[error("invalid xml in response: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("response is not valid utf-8: {0}")]
    FromUtf8(#[from] FromUtf8Error),
    #[error("invalid response from debugger engine: {message}")]
    ResponseFormat { message: String, payload: String },

    // --------------------------------- engine reported errors ------------------------------------
    #[error("debugger engine error {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Reported { code: i32, message: Option<String> },
    #[error("command not implemented by debugger engine")]
    CommandNotImplemented,
    #[error("invalid expression: {}", .message.as_deref().unwrap_or("evaluation failed"))]
    Evaluation { message: Option<String> },
}

impl Error {
    pub(crate) fn response_format(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Error::ResponseFormat {
            message: message.into(),
            payload: payload.into(),
        }
    }

    /// Map an engine error element to an error kind.
    /// Code 4 is always specialized, code 206 only when `eval` issued the command.
    pub(crate) fn reported(code: i32, message: Option<String>, from_eval: bool) -> Self {
        match code {
            CODE_NOT_IMPLEMENTED => Error::CommandNotImplemented,
            CODE_INVALID_EXPRESSION if from_eval => Error::Evaluation { message },
            _ => Error::Reported { code, message },
        }
    }

    /// Return true if the connection which produced this error can't be used anymore.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Error::ConnectionTimeout(_) => true,
            Error::ConnectionClosed => true,
            Error::NotConnected => true,
            Error::MalformedLength(_) => true,
            Error::IO(_) => true,
            // only produced while receiving, the connection is closed by then
            Error::FromUtf8(_) => true,

            Error::Xml(_) => false,
            Error::ResponseFormat { .. } => false,
            Error::Reported { .. } => false,
            Error::CommandNotImplemented => false,
            Error::Evaluation { .. } => false,
        }
    }

    /// Return true if a payload was received but it isn't a well-formed DBGP message.
    pub fn is_response_format(&self) -> bool {
        matches!(
            self,
            Error::Xml(_) | Error::FromUtf8(_) | Error::ResponseFormat { .. }
        )
    }

    /// Return the engine error code if this error was reported by the debugger engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Reported { code, .. } => Some(*code),
            Error::CommandNotImplemented => Some(CODE_NOT_IMPLEMENTED),
            Error::Evaluation { .. } => Some(CODE_INVALID_EXPRESSION),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dbgp", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dbgp", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
