//! Outbound half of the transport.
//!
//! The agent never waits for an acknowledgement: a message handed to
//! [`MessageChannel::send`] is considered delivered as far as the blob
//! protocol is concerned.

use async_trait::async_trait;
use tokio::sync::mpsc;

use pylon_shared::protocol::WireMessage;

use crate::error::BlobError;

#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, message: WireMessage) -> Result<(), BlobError>;
}

#[async_trait]
impl MessageChannel for mpsc::Sender<WireMessage> {
    async fn send(&self, message: WireMessage) -> Result<(), BlobError> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| BlobError::ChannelClosed)
    }
}

#[async_trait]
impl MessageChannel for mpsc::UnboundedSender<WireMessage> {
    async fn send(&self, message: WireMessage) -> Result<(), BlobError> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| BlobError::ChannelClosed)
    }
}
