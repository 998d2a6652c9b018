use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote stream error: {0}")]
    RemoteStream(String),

    #[error("No input received for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<BridgeError> for std::io::Error {
    fn from(err: BridgeError) -> Self {
        use std::io::ErrorKind;
        match err {
            BridgeError::Io(e) => e,
            BridgeError::TransportClosed => ErrorKind::BrokenPipe.into(),
            BridgeError::IdleTimeout(_) => std::io::Error::new(ErrorKind::TimedOut, err.to_string()),
            other => std::io::Error::new(ErrorKind::Other, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        let err = BridgeError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "Transport error: connection reset");

        let err = BridgeError::Config("--command must not be empty".into());
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_io_conversion_kinds() {
        let closed: std::io::Error = BridgeError::TransportClosed.into();
        assert_eq!(closed.kind(), std::io::ErrorKind::BrokenPipe);

        let idle: std::io::Error =
            BridgeError::IdleTimeout(std::time::Duration::from_secs(5)).into();
        assert_eq!(idle.kind(), std::io::ErrorKind::TimedOut);
    }
}
