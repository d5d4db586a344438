use std::fmt;
use std::fmt::Display;
use std::io;
use std::str::Utf8Error;
use std::string::FromUtf8Error;

/// Every error the core can surface, one variant per error kind.
#[derive(Debug)]
pub enum MapiError {
    //////////////////////
    // Config
    //////////////////////
    /// URL / target validation failed before any socket was opened.
    Config(String),

    //////////////////////
    // IO
    //////////////////////
    Io(io::Error),
    Utf8(Utf8Error),
    FromUtf8(FromUtf8Error),

    //////////////////////
    // TLS
    //////////////////////
    Tls(String),

    //////////////////////
    // Protocol
    //////////////////////
    /// Framer or tuple/line parser found bytes that do not fit the wire format.
    Protocol(String),

    //////////////////////
    // Auth
    //////////////////////
    /// Challenge rejected, unsupported protocol version, or no hash algorithm in common.
    Auth(String),

    /// The handshake TTL budget reached zero while following redirects.
    RedirectExhausted,

    //////////////////////
    // Server
    //////////////////////
    /// A well-formed `!SQLSTATE!message` line. Does not close the connection.
    Server { sqlstate: String, message: String },

    //////////////////////
    // Canceled
    //////////////////////
    /// The server aborted an in-flight file transfer, or the connection was
    /// closed concurrently with an in-flight operation.
    Canceled(String),
}

impl Display for MapiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MapiError::Config(s) => write!(f, "configuration error: {}", s),
            MapiError::Io(err) => write!(f, "{}", err),
            MapiError::Utf8(err) => write!(f, "{}", err),
            MapiError::FromUtf8(err) => write!(f, "{}", err),
            MapiError::Tls(s) => write!(f, "TLS error: {}", s),
            MapiError::Protocol(s) => write!(f, "protocol error: {}", s),
            MapiError::Auth(s) => write!(f, "authentication error: {}", s),
            MapiError::RedirectExhausted => write!(f, "too many redirects"),
            MapiError::Server { sqlstate, message } => write!(f, "!{}!{}", sqlstate, message),
            MapiError::Canceled(s) => write!(f, "canceled: {}", s),
        }
    }
}

impl std::error::Error for MapiError {}

impl From<io::Error> for MapiError {
    fn from(error: io::Error) -> Self {
        MapiError::Io(error)
    }
}

impl From<Utf8Error> for MapiError {
    fn from(error: Utf8Error) -> Self {
        MapiError::Utf8(error)
    }
}

impl From<FromUtf8Error> for MapiError {
    fn from(error: FromUtf8Error) -> Self {
        MapiError::FromUtf8(error)
    }
}

impl From<native_tls::Error> for MapiError {
    fn from(error: native_tls::Error) -> Self {
        MapiError::Tls(error.to_string())
    }
}

impl From<native_tls::HandshakeError<std::net::TcpStream>> for MapiError {
    fn from(error: native_tls::HandshakeError<std::net::TcpStream>) -> Self {
        MapiError::Tls(error.to_string())
    }
}

impl MapiError {
    pub fn server(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        MapiError::Server {
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// True for errors that leave the connection usable (the session can
    /// issue another command); false for everything that must close it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MapiError::Server { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_error_displays_as_wire_line() {
        let err = MapiError::server("42S02", "no such table");
        assert_eq!(err.to_string(), "!42S02!no such table");
        assert!(err.is_recoverable());
    }

    #[test]
    fn redirect_exhausted_is_not_recoverable() {
        assert!(!MapiError::RedirectExhausted.is_recoverable());
    }
}
