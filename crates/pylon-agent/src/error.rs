use thiserror::Error;

use pylon_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outbound queue closed")]
    OutboundClosed,
}
