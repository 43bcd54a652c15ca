//! Bluetooth connection handling for the Neuralyzer light
//! Connects to the light, discovers its service and runs reads and writes
//! on bluest, reporting every completion back as a [`LinkEvent`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{
    TRANSPORT_CODE_ADAPTER_UNAVAILABLE, TRANSPORT_CODE_NOT_AUTHORIZED, TRANSPORT_CODE_NOT_CONNECTED,
    TRANSPORT_CODE_NOT_FOUND, TRANSPORT_CODE_TIMEOUT, TRANSPORT_CODE_UNKNOWN, UUID_LIGHT_SERVICE,
};
use crate::core::bluetooth::endpoints::Endpoint;
use crate::core::bluetooth::transport::{Link, LinkEvent, LinkEvents};
use crate::error::{LightError, Result};
use crate::utils::lock_or_recover;

type CharacteristicMap = Arc<Mutex<HashMap<Endpoint, Characteristic>>>;

/// Maps a bluest error onto a stable transport code
pub fn transport_code(error: &bluest::Error) -> i32 {
    match error.kind() {
        ErrorKind::NotFound => TRANSPORT_CODE_NOT_FOUND,
        ErrorKind::NotAuthorized => TRANSPORT_CODE_NOT_AUTHORIZED,
        ErrorKind::NotConnected => TRANSPORT_CODE_NOT_CONNECTED,
        ErrorKind::Timeout => TRANSPORT_CODE_TIMEOUT,
        ErrorKind::AdapterUnavailable => TRANSPORT_CODE_ADAPTER_UNAVAILABLE,
        _ => TRANSPORT_CODE_UNKNOWN,
    }
}

/// A connection to one light over bluest
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    events: LinkEvents,
    characteristics: CharacteristicMap,
    cancel_token: CancellationToken,
}

impl BluestLink {
    /// Starts connecting in the background. `LinkEvent::Connected` follows
    /// on success, `LinkEvent::Disconnected` on failure or link loss.
    pub fn open(adapter: Adapter, device: Device, events: LinkEvents) -> Self {
        let link = Self {
            adapter,
            device,
            events,
            characteristics: Arc::new(Mutex::new(HashMap::new())),
            cancel_token: CancellationToken::new(),
        };
        link.spawn_connect();
        link
    }

    fn spawn_connect(&self) {
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let events = self.events.clone();

        self.spawn_guarded(async move {
            let id = device.id().to_string();
            if !device.is_connected().await {
                info!("Initiating connection to {}...", id);
                if let Err(e) = adapter.connect_device(&device).await {
                    error!("Connection to {} failed: {}", id, e);
                    events.send(LinkEvent::Disconnected);
                    return;
                }
            }
            events.send(LinkEvent::Connected);

            match adapter.device_connection_events(&device).await {
                Ok(mut connection_events) => {
                    while let Some(event) = connection_events.next().await {
                        if matches!(event, ConnectionEvent::Disconnected) {
                            info!("Device {} lost connection", id);
                            events.send(LinkEvent::Disconnected);
                            break;
                        }
                    }
                }
                Err(e) => warn!("Connection events unavailable for {}: {}", id, e),
            }
        });
    }

    /// Runs `task` until it finishes or the link is closed
    fn spawn_guarded<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = self.cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => debug!("Link task cancelled"),
                _ = task => {}
            }
        });
    }

    fn characteristic(&self, endpoint: Endpoint) -> Result<Characteristic> {
        lock_or_recover(&self.characteristics)
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| {
                warn!("Characteristic for {} not discovered", endpoint);
                LightError::TransportFailure(TRANSPORT_CODE_NOT_FOUND)
            })
    }

    async fn discover(device: &Device, characteristics: &CharacteristicMap) -> bluest::Result<bool> {
        let services = device.discover_services_with_uuid(UUID_LIGHT_SERVICE).await?;
        let Some(light_service) = services.into_iter().next() else {
            return Ok(false);
        };
        info!("Found light service: {}", light_service.uuid());

        let discovered = light_service.discover_characteristics().await?;
        let mut map = lock_or_recover(characteristics);
        map.clear();
        for characteristic in discovered {
            match Endpoint::from_uuid(characteristic.uuid()) {
                Some(endpoint) => {
                    info!("Found {} characteristic: {}", endpoint, characteristic.uuid());
                    map.insert(endpoint, characteristic);
                }
                None => debug!("Ignoring characteristic {}", characteristic.uuid()),
            }
        }
        for endpoint in Endpoint::ALL {
            if !map.contains_key(&endpoint) {
                warn!("{} characteristic not exposed by the device", endpoint);
            }
        }
        Ok(true)
    }
}

impl Link for BluestLink {
    fn discover_services(&self) -> Result<()> {
        let device = self.device.clone();
        let characteristics = self.characteristics.clone();
        let events = self.events.clone();

        self.spawn_guarded(async move {
            match Self::discover(&device, &characteristics).await {
                Ok(true) => {
                    events.send(LinkEvent::ServicesDiscovered);
                }
                Ok(false) => {
                    error!("Light service not found: {}", UUID_LIGHT_SERVICE);
                    events.send(LinkEvent::ServiceDiscoveryFailed(TRANSPORT_CODE_NOT_FOUND));
                }
                Err(e) => {
                    error!("Service discovery failed: {}", e);
                    events.send(LinkEvent::ServiceDiscoveryFailed(transport_code(&e)));
                }
            }
        });
        Ok(())
    }

    fn read(&self, endpoint: Endpoint) -> Result<()> {
        let characteristic = self.characteristic(endpoint)?;
        let events = self.events.clone();

        self.spawn_guarded(async move {
            let result = characteristic.read().await.map_err(|e| {
                error!("Read of {} failed: {}", endpoint, e);
                transport_code(&e)
            });
            events.send(LinkEvent::ReadComplete { endpoint, result });
        });
        Ok(())
    }

    fn write(&self, endpoint: Endpoint, payload: Vec<u8>) -> Result<()> {
        let characteristic = self.characteristic(endpoint)?;
        let events = self.events.clone();

        self.spawn_guarded(async move {
            let result = characteristic.write(&payload).await.map_err(|e| {
                error!("Write to {} failed: {}", endpoint, e);
                transport_code(&e)
            });
            events.send(LinkEvent::WriteComplete { endpoint, result });
        });
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let events = self.events.clone();

        self.spawn_guarded(async move {
            if device.is_connected().await {
                info!("Disconnecting from device {}", device.id());
                if let Err(e) = adapter.disconnect_device(&device).await {
                    error!("Failed to disconnect from {}: {}", device.id(), e);
                    events.send(LinkEvent::DisconnectFailed(transport_code(&e)));
                    return;
                }
                info!("Successfully disconnected");
            } else {
                info!("Device {} not connected", device.id());
            }
            events.send(LinkEvent::Disconnected);
        });
        Ok(())
    }

    fn close(&self) {
        self.cancel_token.cancel();
        lock_or_recover(&self.characteristics).clear();

        let adapter = self.adapter.clone();
        let device = self.device.clone();
        tokio::spawn(async move {
            if device.is_connected().await {
                if let Err(e) = adapter.disconnect_device(&device).await {
                    warn!("Failed to release connection to {}: {}", device.id(), e);
                }
            }
        });
        info!("Link for session {} closed", self.events.session());
    }
}
