use std::sync::Arc;

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // Errors from external libraries
    Io(Arc<std::io::Error>),
    Json(Arc<serde_json::Error>),
    FormatTime(Arc<time::error::Format>),
    ParseTime(Arc<time::error::Parse>),
    Poison(String),

    // Errors from gqlmock
    InvalidConnectionName(String),
    InvalidMockBody(String),
    UnsupportedExportVersion(String),
    Network(String),
    Simple(String),
    ConnectionFailed,
    Disconnected,
    NotSynchronized,
    Shutdown,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(ref err) => err.fmt(f),
            Error::Json(ref err) => err.fmt(f),
            Error::FormatTime(ref err) => err.fmt(f),
            Error::ParseTime(ref err) => err.fmt(f),
            Error::Poison(ref err) => write!(f, "{err}"),

            Error::InvalidConnectionName(name) => write!(f, "invalid connection name: {name:?}"),
            Error::InvalidMockBody(reason) => write!(f, "invalid mock body: {reason}"),
            Error::UnsupportedExportVersion(version) => write!(f, "unsupported export file version: {version}"),
            Error::Network(message) => write!(f, "network error: {message}"),
            Error::Simple(ref err) => write!(f, "error occurred: {err}"),
            Error::ConnectionFailed => write!(f, "ConnectionFailed"),
            Error::Disconnected => write!(f, "Disconnected"),
            Error::NotSynchronized => write!(f, "no snapshot received yet"),
            Error::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(Arc::new(err))
    }
}

impl From<time::error::Format> for Error {
    fn from(err: time::error::Format) -> Error {
        Error::FormatTime(Arc::new(err))
    }
}

impl From<time::error::Parse> for Error {
    fn from(err: time::error::Parse) -> Error {
        Error::ParseTime(Arc::new(err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Error {
        Error::Poison(format!("Mutex poison error: {err}"))
    }
}
