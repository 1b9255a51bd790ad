use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, info, trace, warn};

use super::client::{ConnectTarget, ConnectedLink, FoundDevice, LinkClient};
use super::transport::{OperationStatus, Transport, TransportEvent, TransportIssueError};
use crate::error::{EndpointOperation, InteractionError};
use crate::protocol::{self, EndpointId};

const SCAN_SWEEP_INTERVAL: Duration = Duration::from_millis(200);

/// Link client backed by `btleplug`.
pub(crate) struct BtleplugLinkClient;

impl BtleplugLinkClient {
    pub(crate) fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LinkClient for BtleplugLinkClient {
    async fn connect(
        self: Box<Self>,
        target: &ConnectTarget,
    ) -> Result<ConnectedLink, InteractionError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }
        info!(adapter_count = adapters.len(), "starting BLE scan");
        for adapter in &adapters {
            adapter.start_scan(ScanFilter::default()).await?;
        }

        let (adapter, peripheral, device) = find_matching_peripheral(&adapters, target).await?;
        for adapter in &adapters {
            let _ = adapter.stop_scan().await;
        }

        debug!(device_id = device.device_id(), "connecting");
        peripheral.connect().await?;

        let (events_tx, events_rx) = unbounded_channel();
        spawn_disconnect_watcher(adapter, peripheral.clone(), events_tx.clone());
        spawn_notification_pump(peripheral.clone(), events_tx.clone()).await?;

        events_tx
            .send(TransportEvent::LinkUp)
            .expect("event receiver is held by the caller");

        Ok(ConnectedLink {
            device,
            transport: Box::new(RealTransport {
                peripheral,
                events: events_tx,
                characteristics: Arc::new(Mutex::new(HashMap::new())),
            }),
            events: events_rx,
        })
    }
}

async fn find_matching_peripheral(
    adapters: &[Adapter],
    target: &ConnectTarget,
) -> Result<(Adapter, Peripheral, FoundDevice), InteractionError> {
    loop {
        for adapter in adapters {
            for peripheral in adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                let device_id = peripheral.id().to_string();
                let matched = match &target.address {
                    Some(address) => {
                        device_id.eq_ignore_ascii_case(address)
                            || properties
                                .address
                                .to_string()
                                .eq_ignore_ascii_case(address)
                    }
                    None => properties
                        .local_name
                        .as_deref()
                        .is_some_and(|name| name.starts_with(&target.name_prefix)),
                };
                if !matched {
                    continue;
                }

                let adapter_name = adapter
                    .adapter_info()
                    .await
                    .unwrap_or_else(|_| "adapter".to_string());
                let device = FoundDevice::new(
                    adapter_name,
                    device_id,
                    properties.local_name,
                    properties.rssi,
                );
                return Ok((adapter.clone(), peripheral, device));
            }
        }
        sleep(SCAN_SWEEP_INTERVAL).await;
    }
}

fn spawn_disconnect_watcher(
    adapter: Adapter,
    peripheral: Peripheral,
    events: UnboundedSender<TransportEvent>,
) {
    tokio::spawn(async move {
        let mut central_events = match adapter.events().await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%error, "cannot watch adapter events, disconnects will go unnoticed");
                return;
            }
        };
        while let Some(event) = central_events.next().await {
            if let CentralEvent::DeviceDisconnected(id) = event
                && id == peripheral.id()
            {
                let _ = events.send(TransportEvent::LinkDown);
                return;
            }
        }
    });
}

async fn spawn_notification_pump(
    peripheral: Peripheral,
    events: UnboundedSender<TransportEvent>,
) -> Result<(), InteractionError> {
    let mut notifications = peripheral.notifications().await?;
    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            let uuid = notification.uuid.to_string();
            match protocol::endpoint_for_uuid(&uuid) {
                Some(endpoint) => {
                    let _ = events.send(TransportEvent::Notification {
                        endpoint,
                        payload: notification.value,
                    });
                }
                None => trace!(%uuid, "notification from unknown characteristic"),
            }
        }
    });
    Ok(())
}

/// Transport issuing operations against a live `btleplug` peripheral.
///
/// Every operation is spawned; its completion comes back through the event
/// channel. The engine guarantees one operation in flight at a time, so the
/// spawned tasks never race each other.
struct RealTransport {
    peripheral: Peripheral,
    events: UnboundedSender<TransportEvent>,
    characteristics: Arc<Mutex<HashMap<EndpointId, Characteristic>>>,
}

impl RealTransport {
    fn characteristic_for(
        &self,
        endpoint: EndpointId,
        operation: EndpointOperation,
    ) -> Result<Characteristic, TransportIssueError> {
        self.characteristics
            .lock()
            .expect("characteristic map lock")
            .get(&endpoint)
            .cloned()
            .ok_or(TransportIssueError {
                endpoint,
                operation,
            })
    }
}

impl Transport for RealTransport {
    fn discover_services(&mut self) -> Result<(), TransportIssueError> {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let characteristics = Arc::clone(&self.characteristics);
        tokio::spawn(async move {
            let ok = match peripheral.discover_services().await {
                Ok(()) => {
                    let mut resolved = characteristics
                        .lock()
                        .expect("characteristic map lock");
                    for characteristic in peripheral.characteristics() {
                        let uuid = characteristic.uuid.to_string();
                        if let Some(endpoint) = protocol::endpoint_for_uuid(&uuid) {
                            resolved.insert(endpoint, characteristic);
                        }
                    }
                    for endpoint in protocol::known_endpoints() {
                        if !resolved.contains_key(&endpoint) {
                            let metadata = protocol::endpoint_metadata(endpoint);
                            debug!(
                                %endpoint,
                                service = metadata.service_uuid(),
                                uuid = metadata.uuid(),
                                "endpoint not present on this device"
                            );
                        }
                    }
                    debug!(
                        resolved = resolved.len(),
                        "GATT enumeration finished"
                    );
                    true
                }
                Err(error) => {
                    warn!(%error, "GATT enumeration failed");
                    false
                }
            };
            let _ = events.send(TransportEvent::ServicesDiscovered { ok });
        });
        Ok(())
    }

    fn read(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        let characteristic = self.characteristic_for(endpoint, EndpointOperation::Read)?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match peripheral.read(&characteristic).await {
                Ok(value) => TransportEvent::ReadComplete {
                    endpoint,
                    status: OperationStatus::Success,
                    value,
                },
                Err(error) => {
                    warn!(%endpoint, %error, "read failed");
                    TransportEvent::ReadComplete {
                        endpoint,
                        status: OperationStatus::Failure,
                        value: Vec::new(),
                    }
                }
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    fn write(&mut self, endpoint: EndpointId, payload: &[u8]) -> Result<(), TransportIssueError> {
        let characteristic = self.characteristic_for(endpoint, EndpointOperation::Write)?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let payload = payload.to_vec();
        tokio::spawn(async move {
            let status = match peripheral
                .write(&characteristic, &payload, WriteType::WithResponse)
                .await
            {
                Ok(()) => OperationStatus::Success,
                Err(error) => {
                    warn!(%endpoint, %error, "write failed");
                    OperationStatus::Failure
                }
            };
            let _ = events.send(TransportEvent::WriteComplete { endpoint, status });
        });
        Ok(())
    }

    fn subscribe(&mut self, endpoint: EndpointId) -> Result<(), TransportIssueError> {
        let characteristic = self.characteristic_for(endpoint, EndpointOperation::Subscribe)?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let status = match peripheral.subscribe(&characteristic).await {
                Ok(()) => OperationStatus::Success,
                Err(error) => {
                    warn!(%endpoint, %error, "subscribe failed");
                    OperationStatus::Failure
                }
            };
            let _ = events.send(TransportEvent::SubscribeComplete { endpoint, status });
        });
        Ok(())
    }

    fn on_disconnect_cleanup(&mut self) {
        // No stale-cache refresh exists for this stack; the hook stays for
        // backends that need one.
        trace!("disconnect cleanup hook invoked");
        self.characteristics
            .lock()
            .expect("characteristic map lock")
            .clear();
    }
}
