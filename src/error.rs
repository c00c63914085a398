use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::hex_codec::HexError;

/// Coarse error classes, used by batch operations to decide whether a failure
/// should abort the whole run or only the current unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Format,
    RemoteNotFound,
    Resource,
    BufferTooSmall,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial link failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// No complete answer line arrived within the configured read timeout.
    #[error("no answer from the phone after {0:?}")]
    Timeout(Duration),

    /// The phone answered the `ERROR` sentinel.
    #[error("the phone answered ERROR to \"{command}\"")]
    RemoteError { command: String },

    /// The serial link was closed while waiting for data.
    #[error("the serial link was closed")]
    Closed,

    #[error("malformed data: {0}")]
    Format(String),

    #[error("invalid hexadecimal data: {0}")]
    Hex(#[from] HexError),

    #[error("unknown MMS header field 0x{0:02X}")]
    UnknownHeaderField(u8),

    #[error("\"{0}\" does not exist on the phone")]
    NotFound(String),

    #[error("local file \"{}\": {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An answer did not fit in the buffer the caller sized for it.
    #[error("answer does not fit in a {max_length}-byte buffer")]
    BufferTooSmall { max_length: usize },
}

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    pub fn resource(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Resource {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Timeout(_) | Error::RemoteError { .. } | Error::Closed => {
                ErrorKind::Transport
            }
            Error::Format(_) | Error::Hex(_) | Error::UnknownHeaderField(_) => ErrorKind::Format,
            Error::NotFound(_) => ErrorKind::RemoteNotFound,
            Error::Resource { .. } => ErrorKind::Resource,
            Error::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(Error::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Transport);
        assert_eq!(
            Error::RemoteError { command: "AT".into() }.kind(),
            ErrorKind::Transport
        );
        assert_eq!(Error::UnknownHeaderField(0x7F).kind(), ErrorKind::Format);
        assert_eq!(Error::Hex(HexError::OddLength).kind(), ErrorKind::Format);
        assert_eq!(Error::NotFound("C:\\x".into()).kind(), ErrorKind::RemoteNotFound);
        assert_eq!(
            Error::BufferTooSmall { max_length: 2 }.kind(),
            ErrorKind::BufferTooSmall
        );
        let err = Error::resource("out.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.to_string().contains("out.txt"));
    }
}
