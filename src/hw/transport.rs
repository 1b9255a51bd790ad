use thiserror::Error;

use crate::error::EndpointOperation;
use crate::protocol::EndpointId;

/// Failure to hand an operation to the radio stack.
///
/// Issue failures are distinct from failed completions: the operation never
/// left the host.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("failed to issue {operation} on `{endpoint}`")]
pub struct TransportIssueError {
    pub endpoint: EndpointId,
    pub operation: EndpointOperation,
}

/// Completion status reported by the radio stack for one operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperationStatus {
    Success,
    Failure,
}

impl OperationStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Asynchronous completions and link changes delivered by the transport.
///
/// The radio stack guarantees sequential delivery: no two events overlap from
/// the engine's point of view.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportEvent {
    /// The physical link came up.
    LinkUp,
    /// The physical link dropped.
    LinkDown,
    /// GATT service enumeration finished.
    ServicesDiscovered { ok: bool },
    /// A read issued earlier completed.
    ReadComplete {
        endpoint: EndpointId,
        status: OperationStatus,
        value: Vec<u8>,
    },
    /// A write issued earlier was acknowledged.
    WriteComplete {
        endpoint: EndpointId,
        status: OperationStatus,
    },
    /// A subscription request was acknowledged.
    SubscribeComplete {
        endpoint: EndpointId,
        status: OperationStatus,
    },
    /// The peripheral pushed a notification.
    Notification {
        endpoint: EndpointId,
        payload: Vec<u8>,
    },
}

/// Outbound endpoint operations.
///
/// Implementations initiate the operation and return immediately; the
/// completion arrives later as a [`TransportEvent`]. At most one operation is
/// outstanding at a time — the engine enforces this, implementations may rely
/// on it.
pub trait Transport {
    /// Starts GATT service enumeration.
    fn discover_services(&mut self) -> Result<(), TransportIssueError>;

    /// Issues a read of one endpoint.
    fn read(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError>;

    /// Issues a write to one endpoint.
    fn write(&mut self, endpoint: EndpointId, payload: &[u8]) -> Result<(), TransportIssueError>;

    /// Requests change notifications for one endpoint.
    fn subscribe(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError>;

    /// Platform hook invoked when the link drops, before engine state is
    /// reset. Backends with stale-cache workarounds run them here.
    fn on_disconnect_cleanup(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn discover_services(&mut self) -> Result<(), TransportIssueError> {
        (**self).discover_services()
    }

    fn read(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        (**self).read(endpoint)
    }

    fn write(&mut self, endpoint: EndpointId, payload: &[u8]) -> Result<(), TransportIssueError> {
        (**self).write(endpoint, payload)
    }

    fn subscribe(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        (**self).subscribe(endpoint)
    }

    fn on_disconnect_cleanup(&mut self) {
        (**self).on_disconnect_cleanup();
    }
}
