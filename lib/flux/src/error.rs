use std::fmt;
use std::io;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error kinds surfaced by the gateway core. Conditions the protocol layer
/// treats as non-fatal (CRC failure, framer overflow, session drop, parse
/// error) are logged and counted on their hot path rather than returned
/// here; `GatewayError` is for call sites where the operation genuinely
/// aborts.
#[derive(Debug)]
pub enum ErrorKind {
    /// Rejected input to the builder: non-hex in a HEX element, non-finite
    /// in a BCD element, unknown element id in a command request.
    Validation,
    /// No device configuration exists for a `(linkId, remoteCode)` pair.
    NotFound,
    /// Guard already committed or rolled back.
    TransactionTerminated,
    /// Database reported commit failure.
    CommitFailed,
    /// Link manager initialized a second time while active.
    AlreadyInitialized,
    Io(io::ErrorKind),
}

#[derive(Debug)]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> GatewayError {
        GatewayError {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> GatewayError {
        GatewayError::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> GatewayError {
        GatewayError::new(ErrorKind::NotFound, message)
    }

    pub fn transaction_terminated() -> GatewayError {
        GatewayError::new(ErrorKind::TransactionTerminated, "transaction already committed or rolled back")
    }

    pub fn commit_failed(message: impl Into<String>) -> GatewayError {
        GatewayError::new(ErrorKind::CommitFailed, message)
    }

    pub fn already_initialized() -> GatewayError {
        GatewayError::new(ErrorKind::AlreadyInitialized, "link manager already initialized")
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<io::Error> for GatewayError {
    fn from(err: io::Error) -> Self {
        GatewayError {
            kind: ErrorKind::Io(err.kind()),
            message: err.to_string(),
        }
    }
}
