//! Transport seam: a connected session exposing the control and data endpoints.

use async_trait::async_trait;

use crate::protocol::Opcode;

/// Callback invoked with every raw value the device pushes on the control endpoint.
/// Runs on the caller's scheduler and must not block.
pub type NotificationHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Connected session with the device. Writes are confirmed: they return once the
/// peer's link layer acknowledged them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write_control(&self, opcode: Opcode) -> Result<(), TransportError>;

    async fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Register `handler` for control-endpoint notifications.
    async fn subscribe_control(&self, handler: NotificationHandler) -> Result<(), TransportError>;

    async fn unsubscribe_control(&self) -> Result<(), TransportError>;

    /// Negotiated transport unit; the controller subtracts protocol overhead from it.
    fn max_payload_size(&self) -> usize;
}

/// Failure talking to the device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    Write(String),
    #[error("subscription failed: {0}")]
    Subscribe(String),
    #[error("device disconnected")]
    Disconnected,
}
