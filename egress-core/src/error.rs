use std::fmt;
use std::io;

use thiserror::Error;

/// Closed classification of socket-level failures. Every OS error observed
/// on a stream socket folds into one of these kinds; callers match on the
/// kind, never on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Resource temporarily unavailable; re-park on readiness.
    Again,
    InvalidHandle,
    InvalidAddress,
    InProgress,
    AlreadyConnected,
    Timeout,
    NetUnreachable,
    HostUnreachable,
    ConnectionRefused,
    Unsupported,
    Generic,
}

impl SocketKind {
    pub fn from_io(err: &io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            WouldBlock | Interrupted => SocketKind::Again,
            TimedOut => SocketKind::Timeout,
            ConnectionRefused => SocketKind::ConnectionRefused,
            NetworkUnreachable => SocketKind::NetUnreachable,
            HostUnreachable => SocketKind::HostUnreachable,
            InvalidInput | AddrNotAvailable => SocketKind::InvalidAddress,
            Unsupported => SocketKind::Unsupported,
            _ => SocketKind::Generic,
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SocketKind::Again => "resource temporarily unavailable",
            SocketKind::InvalidHandle => "invalid socket handle",
            SocketKind::InvalidAddress => "invalid address",
            SocketKind::InProgress => "operation in progress",
            SocketKind::AlreadyConnected => "socket is already connected",
            SocketKind::Timeout => "operation timed out",
            SocketKind::NetUnreachable => "network unreachable",
            SocketKind::HostUnreachable => "host unreachable",
            SocketKind::ConnectionRefused => "connection refused",
            SocketKind::Unsupported => "unsupported socket operation",
            SocketKind::Generic => "socket error",
        };
        f.write_str(text)
    }
}

/// Egress error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{message}")]
    Socket { kind: SocketKind, message: String },

    #[error("invalid address `{input}`")]
    Parse { input: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn socket<S: Into<String>>(kind: SocketKind, message: S) -> Self {
        Self::Socket {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an I/O error and wraps it with the failing operation.
    pub fn from_io<S: Into<String>>(err: &io::Error, what: S) -> Self {
        Self::Socket {
            kind: SocketKind::from_io(err),
            message: format!("{}: {}", what.into(), err),
        }
    }

    pub fn parse<S: Into<String>>(input: S) -> Self {
        Self::Parse {
            input: input.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Socket classification, when this is a socket error.
    pub fn socket_kind(&self) -> Option<SocketKind> {
        match self {
            Self::Socket { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
