//! Application state management
//! The single owned instance tying discovery and the light session together.
//! Collaborators receive a reference to it; nothing here is global.

use std::sync::Arc;

use log::info;

use crate::config::LightConfig;
use crate::core::bluetooth::{
    AlwaysGranted, Authorization, BluetoothManager, BluetoothScanner, LinkTransport,
    PeripheralAddress, ScanTransport, SessionClient,
};
use crate::error::Result;

pub struct LightController {
    /// Discovery engine
    pub scanner: BluetoothScanner,
    /// Session with the selected light
    pub session: SessionClient,
}

impl LightController {
    /// Must be called from within a tokio runtime
    pub fn new(
        scan_transport: Arc<dyn ScanTransport>,
        link_transport: Arc<dyn LinkTransport>,
        authorization: Arc<dyn Authorization>,
        config: LightConfig,
    ) -> Self {
        Self {
            scanner: BluetoothScanner::new(scan_transport, authorization.clone(), config.scan),
            session: SessionClient::new(link_transport, authorization, config.session),
        }
    }

    /// Creates a controller on the default Bluetooth adapter
    pub async fn with_bluetooth(config: LightConfig) -> anyhow::Result<Self> {
        info!("Initializing BluetoothManager...");
        let manager = Arc::new(BluetoothManager::new().await?);
        Ok(Self::new(
            manager.clone(),
            manager,
            Arc::new(AlwaysGranted),
            config,
        ))
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.scanner.start_scan().await
    }

    /// Stops scanning and forgets every sighting of this scan
    pub async fn stop_scan(&self) -> Result<()> {
        self.scanner.stop_scan().await?;
        self.scanner.clear_all();
        Ok(())
    }

    /// Opens a session with a discovered light. The discovery cache is
    /// cleared so a later scan reports fresh results.
    pub async fn connect(&self, address: impl Into<PeripheralAddress>) -> Result<()> {
        self.scanner.clear_all();
        self.session.connect(address).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    pub async fn shutdown(self) {
        self.session.shutdown().await;
    }
}
