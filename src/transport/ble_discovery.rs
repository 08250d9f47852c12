//! BLE peer discovery by advertised service UUID

use crate::config::BleConfig;
use crate::error::TransportError;
use bluer::{Adapter, AdapterEvent, Device, Uuid};
use futures::StreamExt;
use std::collections::HashSet;
use tokio::time::timeout;
use tracing::{debug, info};

/// Single filter predicate: the peer advertises `service`
pub fn advertises_service(uuids: &HashSet<Uuid>, service: &Uuid) -> bool {
    uuids.contains(service)
}

/// BLE discovery service
pub struct BleDiscovery {
    config: BleConfig,
}

impl BleDiscovery {
    /// Create a new discovery service
    pub fn new(config: BleConfig) -> Self {
        Self { config }
    }

    /// Get the default Bluetooth adapter
    pub async fn get_adapter() -> Result<Adapter, TransportError> {
        let session = bluer::Session::new().await.map_err(connection_error)?;
        let adapter = session.default_adapter().await.map_err(connection_error)?;
        adapter.set_powered(true).await.map_err(connection_error)?;
        Ok(adapter)
    }

    /// Find the peer: the configured address if any, otherwise the first
    /// device seen advertising the service within the scan timeout
    pub async fn find_peer(&self, adapter: &Adapter) -> Result<Device, TransportError> {
        if let Some(addr) = self.config.peer_address {
            info!("[BLE] Using configured peer {}", addr);
            return adapter.device(addr).map_err(connection_error);
        }

        info!("[BLE] Scanning for peer advertising {}", self.config.service_uuid);
        let discover = adapter.discover_devices().await.map_err(connection_error)?;
        tokio::pin!(discover);

        let scan = timeout(self.config.scan_timeout, async {
            while let Some(evt) = discover.next().await {
                if let AdapterEvent::DeviceAdded(addr) = evt {
                    let Ok(device) = adapter.device(addr) else {
                        continue;
                    };
                    if self.is_peer(&device).await {
                        return Some(device);
                    }
                    debug!("[BLE] Ignoring {}", addr);
                }
            }
            None
        })
        .await;

        match scan {
            Ok(Some(device)) => {
                let name = device.name().await.ok().flatten();
                info!(
                    "[BLE] Found peer: {}",
                    name.unwrap_or_else(|| device.address().to_string())
                );
                Ok(device)
            }
            Ok(None) => Err(TransportError::Connection(
                "Discovery stream ended before a peer was found".into(),
            )),
            Err(_) => Err(TransportError::Connection(format!(
                "No peer advertising {} found within {:?}",
                self.config.service_uuid, self.config.scan_timeout
            ))),
        }
    }

    async fn is_peer(&self, device: &Device) -> bool {
        match device.uuids().await {
            Ok(Some(uuids)) => advertises_service(&uuids, &self.config.service_uuid),
            _ => false,
        }
    }
}

fn connection_error(e: bluer::Error) -> TransportError {
    TransportError::Connection(e.to_string())
}
