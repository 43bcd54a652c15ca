//! Discovery engine for Neuralyzer lights
//! Runs the transport scan, deduplicates sightings by address and emits
//! each newly seen peripheral once per cache cycle.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::core::bluetooth::constants::TRANSPORT_CODE_UNKNOWN;
use crate::core::bluetooth::endpoints::Endpoint;
use crate::core::bluetooth::transport::{Authorization, ScanEvent, ScanTransport};
use crate::core::bluetooth::types::{
    Advertisement, DiscoveredPeripheral, PeripheralAddress, ScanStatus,
};
use crate::error::{Capability, LightError, Result};
use crate::utils::lock_or_recover;

type DiscoveryCache = Arc<Mutex<HashMap<PeripheralAddress, Advertisement>>>;

/// Peripherals seen for the first time during one scan
pub struct DiscoveryStream {
    rx: mpsc::UnboundedReceiver<DiscoveredPeripheral>,
}

impl Stream for DiscoveryStream {
    type Item = DiscoveredPeripheral;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct ScanTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BluetoothScanner {
    transport: Arc<dyn ScanTransport>,
    authorization: Arc<dyn Authorization>,
    config: ScanConfig,
    cache: DiscoveryCache,
    status: Arc<watch::Sender<ScanStatus>>,
    discoveries: Mutex<Option<DiscoveryStream>>,
    scan_task: tokio::sync::Mutex<Option<ScanTask>>,
}

impl BluetoothScanner {
    pub fn new(
        transport: Arc<dyn ScanTransport>,
        authorization: Arc<dyn Authorization>,
        config: ScanConfig,
    ) -> Self {
        let (status, _) = watch::channel(ScanStatus::Unknown);
        Self {
            transport,
            authorization,
            config,
            cache: Arc::new(Mutex::new(HashMap::new())),
            status: Arc::new(status),
            discoveries: Mutex::new(None),
            scan_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Observe the scan status
    pub fn status(&self) -> watch::Receiver<ScanStatus> {
        self.status.subscribe()
    }

    /// Take the discovery stream of the current scan. Each `start_scan`
    /// creates a fresh stream and ends the previous one.
    pub fn take_discoveries(&self) -> Option<DiscoveryStream> {
        lock_or_recover(&self.discoveries).take()
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.ensure_permission()?;

        let mut scan_task = self.scan_task.lock().await;
        if let Some(task) = scan_task.take() {
            info!("Stopping previous scan before starting a new one.");
            Self::finish_task(task).await;
            self.transport.stop_scan().await?;
        }

        self.clear_all();

        let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();
        *lock_or_recover(&self.discoveries) = Some(DiscoveryStream { rx: discovered_rx });

        // Visible before any advertisement of the new scan is processed.
        self.status.send_replace(ScanStatus::Scanning);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let service = self.config.filter_by_service.then(Endpoint::service);
        if let Err(e) = self.transport.start_scan(service, events_tx).await {
            error!("Failed to start scan: {}", e);
            let code = match &e {
                LightError::TransportFailure(code) => *code,
                _ => TRANSPORT_CODE_UNKNOWN,
            };
            self.status.send_replace(ScanStatus::Error(code));
            return Err(e);
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::internal_scan_task(
            events_rx,
            self.cache.clone(),
            self.status.clone(),
            discovered_tx,
            self.transport.clone(),
            cancel_token.clone(),
            self.config.min_rssi,
        ));
        *scan_task = Some(ScanTask {
            cancel_token,
            handle,
        });

        info!("Device scan task started.");
        Ok(())
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.ensure_permission()?;
        info!("Stopping Bluetooth scan.");

        // Held until the status is published so a concurrent start cannot interleave.
        let mut scan_task = self.scan_task.lock().await;
        match scan_task.take() {
            Some(task) => Self::finish_task(task).await,
            None => info!("No active scan task handle found to wait for."),
        }
        self.transport.stop_scan().await?;

        self.status.send_if_modified(|status| {
            let changed = *status != ScanStatus::Stopped;
            *status = ScanStatus::Stopped;
            changed
        });
        Ok(())
    }

    /// Forget every cached sighting so each peripheral is reported again
    pub fn clear_all(&self) {
        lock_or_recover(&self.cache).clear();
    }

    /// Forget one cached sighting
    pub fn clear_one(&self, address: &PeripheralAddress) -> Option<Advertisement> {
        lock_or_recover(&self.cache).remove(address)
    }

    /// Snapshot of the cached sightings, ordered by address
    pub fn cached(&self) -> Vec<Advertisement> {
        let mut cached: Vec<_> = lock_or_recover(&self.cache).values().cloned().collect();
        cached.sort_by(|a, b| a.address.cmp(&b.address));
        cached
    }

    fn ensure_permission(&self) -> Result<()> {
        if self.authorization.is_granted(Capability::Scan) {
            Ok(())
        } else {
            warn!("Scan permission missing");
            Err(LightError::PermissionDenied(Capability::Scan))
        }
    }

    async fn finish_task(task: ScanTask) {
        task.cancel_token.cancel();
        if let Err(e) = task.handle.await {
            if e.is_cancelled() {
                info!("Scan task was cancelled successfully.");
            } else {
                error!("Scan task finished with an unexpected join error: {:?}", e);
            }
        }
    }

    async fn internal_scan_task(
        mut events: mpsc::UnboundedReceiver<ScanEvent>,
        cache: DiscoveryCache,
        status: Arc<watch::Sender<ScanStatus>>,
        discovered_tx: mpsc::UnboundedSender<DiscoveredPeripheral>,
        transport: Arc<dyn ScanTransport>,
        cancel_token: CancellationToken,
        min_rssi: Option<i16>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Some(ScanEvent::Advertisement(adv)) => {
                        Self::handle_advertisement(&cache, &discovered_tx, adv, min_rssi);
                    }
                    Some(ScanEvent::Failed(code)) => {
                        error!("Scan failed with code {}", code);
                        status.send_replace(ScanStatus::Error(code));
                        if let Err(e) = transport.stop_scan().await {
                            error!("Failed to stop scan after failure: {}", e);
                        }
                        break;
                    }
                    None => {
                        info!("Bluetooth scan event stream has ended.");
                        break;
                    }
                },
            }
        }
    }

    fn handle_advertisement(
        cache: &DiscoveryCache,
        discovered_tx: &mpsc::UnboundedSender<DiscoveredPeripheral>,
        adv: Advertisement,
        min_rssi: Option<i16>,
    ) {
        if let Some(threshold) = min_rssi {
            if adv.rssi.is_none_or(|rssi| rssi < threshold) {
                debug!("Ignoring weak signal from {} ({:?})", adv.address, adv.rssi);
                return;
            }
        }

        // Check, insert and emit under one lock so an address is never emitted twice.
        let mut cache = lock_or_recover(cache);
        if cache.contains_key(&adv.address) {
            debug!("Exist Element - SKIP {}", adv.address);
            return;
        }
        info!("Smart LED detected: {}", adv.address);
        cache.insert(adv.address.clone(), adv.clone());
        if discovered_tx.send(adv.into()).is_err() {
            debug!("Discovery stream dropped by its consumer");
        }
    }
}
