use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use super::transport::{Transport, TransportEvent};
use crate::error::InteractionError;

/// A peripheral found during discovery.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoundDevice {
    adapter: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    #[must_use]
    pub fn new(
        adapter: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter,
            device_id,
            local_name,
            rssi,
        }
    }

    #[must_use]
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub(crate) fn local_name_starts_with(&self, prefix: &str) -> bool {
        self.local_name
            .as_deref()
            .is_some_and(|name| name.starts_with(prefix))
    }
}

/// How to pick the peripheral to connect to.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// BLE local-name prefix to match during discovery.
    pub name_prefix: String,
    /// Exact device address/identifier; takes precedence over the prefix.
    pub address: Option<String>,
}

/// A connected link: the transport half plus the callback event stream.
pub struct ConnectedLink {
    /// The peripheral the link was established to.
    pub device: FoundDevice,
    /// Operation issuer owned by the session.
    pub transport: Box<dyn Transport + Send>,
    /// Sequential transport callbacks; feed them to the session.
    pub events: UnboundedReceiver<TransportEvent>,
}

/// Discovers a spectrometer and establishes the transport link.
#[async_trait]
pub trait LinkClient: Send {
    /// Connects to the first matching peripheral.
    ///
    /// The returned event stream starts with [`TransportEvent::LinkUp`]; the
    /// session drives everything from there.
    async fn connect(
        self: Box<Self>,
        target: &ConnectTarget,
    ) -> Result<ConnectedLink, InteractionError>;
}
