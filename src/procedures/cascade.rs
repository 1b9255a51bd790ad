use tracing::debug;

use crate::error::{EndpointOperation, EngineError};
use crate::hw::{OperationStatus, Transport};
use crate::protocol::{EndpointId, NOTIFICATION_CASCADE};

use super::ensure_success;

/// Progress of the post-discovery subscription cascade.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum CascadeProgress {
    Pending,
    Ready,
}

/// Subscribes to the notify endpoints one at a time, in declared order.
///
/// The radio stack handles one request at a time, so each subscription is
/// issued only once the previous acknowledgement has arrived.
#[derive(Debug)]
pub(crate) struct NotificationCascade {
    position: usize,
}

impl NotificationCascade {
    pub(crate) fn new() -> Self {
        Self { position: 0 }
    }

    pub(crate) fn start(&mut self, link: &mut dyn Transport) -> Result<(), EngineError> {
        subscribe(link, NOTIFICATION_CASCADE[0])
    }

    /// Advances the cascade on one subscribe acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error when the acknowledgement is for the wrong endpoint,
    /// reports a failure status, or the next subscription cannot be issued.
    pub(crate) fn on_subscribe_ack(
        &mut self,
        endpoint: EndpointId,
        status: OperationStatus,
        link: &mut dyn Transport,
    ) -> Result<CascadeProgress, EngineError> {
        let expected = NOTIFICATION_CASCADE[self.position];
        if endpoint != expected {
            return Err(EngineError::violation(
                endpoint,
                crate::error::ProtocolViolation::UnexpectedEndpoint,
            ));
        }
        ensure_success(status, expected, EndpointOperation::Subscribe)?;

        self.position += 1;
        if self.position == NOTIFICATION_CASCADE.len() {
            debug!("notification cascade finished, session is ready");
            return Ok(CascadeProgress::Ready);
        }
        subscribe(link, NOTIFICATION_CASCADE[self.position])?;
        Ok(CascadeProgress::Pending)
    }
}

fn subscribe(link: &mut dyn Transport, endpoint: EndpointId) -> Result<(), EngineError> {
    link.subscribe(endpoint)
        .map_err(|error| EngineError::operation_failed(error.endpoint, error.operation))
}
