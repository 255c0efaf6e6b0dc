use std::error::Error as StdError;
use std::fmt;
use std::io;
use tokio_tungstenite::tungstenite;

/// Everything that can end a relay session.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid upstream endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to acquire a token for the upstream connection")]
    Credential(#[source] anyhow::Error),

    #[error("upstream rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("upstream handshake failed")]
    Handshake(#[from] tungstenite::Error),

    #[error("transport failure")]
    Transport(#[from] TransportError),

    #[error("upstream requested unknown tool '{0}'")]
    UnknownTool(String),

    #[error("arguments for tool '{tool}' are not valid JSON")]
    ToolArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tool '{tool}' failed")]
    Tool {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("the {0} socket is no longer accepting frames")]
    PeerClosed(&'static str),

    #[error("failed to serialize an event")]
    Serialize(#[from] serde_json::Error),
}

impl RelayError {
    /// Resets and vanished peers are how a session normally ends when a user navigates away.
    pub fn is_quiet(&self) -> bool {
        match self {
            RelayError::Transport(e) => e.is_connection_reset(),
            RelayError::PeerClosed(_) => true,
            _ => false,
        }
    }
}

/// An I/O failure on either socket, whatever WebSocket implementation produced it.
#[derive(Debug)]
pub struct TransportError {
    inner: Box<dyn StdError + Send + Sync + 'static>,
}

impl TransportError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            inner: error.into(),
        }
    }

    pub fn is_connection_reset(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(&*self.inner);
        while let Some(error) = current {
            if let Some(io_error) = error.downcast_ref::<io::Error>() {
                if is_reset_kind(io_error.kind()) {
                    return true;
                }
            }
            if let Some(ws_error) = error.downcast_ref::<tungstenite::Error>() {
                if let tungstenite::Error::Io(io_error) = ws_error {
                    if is_reset_kind(io_error.kind()) {
                        return true;
                    }
                }
                if matches!(
                    ws_error,
                    tungstenite::Error::ConnectionClosed
                        | tungstenite::Error::AlreadyClosed
                        | tungstenite::Error::Protocol(
                            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
                        )
                ) {
                    return true;
                }
            }
            current = error.source();
        }
        false
    }
}

fn is_reset_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.inner)
    }
}
