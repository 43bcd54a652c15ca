//! Bluetooth manager for the Neuralyzer light
//! Owns the bluest adapter and the registry of devices seen while scanning,
//! and implements both transport seams on top of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::connection::{transport_code, BluestLink};
use crate::core::bluetooth::constants::TRANSPORT_CODE_SCAN_ENDED;
use crate::core::bluetooth::transport::{Link, LinkEvents, LinkTransport, ScanEvent, ScanTransport};
use crate::core::bluetooth::types::{Advertisement, PeripheralAddress};
use crate::error::{LightError, Result};
use crate::utils::lock_or_recover;

type DeviceRegistry = Arc<Mutex<HashMap<PeripheralAddress, Device>>>;

struct ScanTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Manages the Bluetooth adapter
pub struct BluetoothManager {
    adapter: Adapter,
    /// Devices seen while scanning, keyed by address
    devices: DeviceRegistry,
    scan_task: Mutex<Option<ScanTask>>,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager on the default adapter
    pub async fn new() -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            scan_task: Mutex::new(None),
        })
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: DeviceRegistry,
        service: Option<Uuid>,
        events: mpsc::UnboundedSender<ScanEvent>,
        cancel_token: CancellationToken,
    ) {
        info!("Starting bluetooth scan");
        let services: Vec<Uuid> = service.into_iter().collect();
        let mut scan_stream = match adapter.scan(&services).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start bluetooth scan: {}", e);
                let _ = events.send(ScanEvent::Failed(transport_code(&e)));
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = scan_stream.next() => match result {
                    Some(discovered) => {
                        let device = discovered.device;
                        let id = device.id().to_string();
                        debug!("Found device - ID: {}, RSSI: {:?}", id, discovered.rssi);

                        let address = PeripheralAddress::from_device_id(&id);
                        let name = discovered
                            .adv_data
                            .local_name
                            .or_else(|| device.name().ok());
                        lock_or_recover(&devices).insert(address.clone(), device);

                        let advertisement = Advertisement {
                            address,
                            name,
                            rssi: discovered.rssi,
                        };
                        if events.send(ScanEvent::Advertisement(advertisement)).is_err() {
                            debug!("Scan consumer gone, ending scan");
                            break;
                        }
                    }
                    None => {
                        info!("Bluetooth scan stream has ended.");
                        let _ = events.send(ScanEvent::Failed(TRANSPORT_CODE_SCAN_ENDED));
                        break;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl ScanTransport for BluetoothManager {
    async fn start_scan(
        &self,
        service: Option<Uuid>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<()> {
        self.stop_scan().await?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::internal_scan_task(
            self.adapter.clone(),
            self.devices.clone(),
            service,
            events,
            cancel_token.clone(),
        ));
        *lock_or_recover(&self.scan_task) = Some(ScanTask {
            cancel_token,
            handle,
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        let task = lock_or_recover(&self.scan_task).take();
        if let Some(task) = task {
            task.cancel_token.cancel();
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
            info!("Bluetooth scan stopped.");
        }
        Ok(())
    }
}

#[async_trait]
impl LinkTransport for BluetoothManager {
    async fn open(&self, address: &PeripheralAddress, events: LinkEvents) -> Result<Box<dyn Link>> {
        let device = lock_or_recover(&self.devices)
            .get(address)
            .cloned()
            .ok_or_else(|| LightError::DeviceNotFound(address.clone()))?;

        info!("Device details - Address: {}, ID: {}", address, device.id());
        Ok(Box::new(BluestLink::open(self.adapter.clone(), device, events)))
    }
}
