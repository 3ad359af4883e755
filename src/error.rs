use thiserror::Error;

/// Everything that can go wrong on the client side of a battle.
///
/// None of these are fatal: the drivers log them and carry on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Malformed message: {0}")]
    Protocol(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("{0}")]
    Server(String),
    #[error("Not allowed right now: {0}")]
    InvalidAction(&'static str),
    #[error("Select exactly 4 cards before confirming ({0} selected)")]
    SelectionIncomplete(usize),
    #[error("Server unreachable after {0} reconnect attempts")]
    Unreachable(u32),
    #[error("Page error: {0}")]
    Dom(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
