mod btleplug_backend;
mod client;
mod fake_backend;
mod transport;

pub use self::client::{ConnectTarget, ConnectedLink, FoundDevice, LinkClient};
pub use self::fake_backend::{
    FakeBackendConfig, FakePeripheral, FakeStoredScan, IssuedOp, OpLog, PeripheralFixture,
    ScanFixture, ScriptedLink, packed_configuration,
};
pub use self::transport::{OperationStatus, Transport, TransportEvent, TransportIssueError};

use self::btleplug_backend::BtleplugLinkClient;
use self::fake_backend::FakeLinkClient;

/// Creates a link client backed by the real BLE transport.
#[must_use]
pub fn real_link_client() -> Box<dyn LinkClient> {
    Box::new(BtleplugLinkClient::new())
}

/// Creates a link client backed by fake fixtures.
#[must_use]
pub fn fake_link_client(config: FakeBackendConfig) -> Box<dyn LinkClient> {
    Box::new(FakeLinkClient::new(config))
}
