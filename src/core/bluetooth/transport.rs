//! Transport seams for the light core
//!
//! The scanner and the session client never talk to a Bluetooth stack
//! directly. They drive a [`ScanTransport`] and a [`LinkTransport`] and
//! consume the events those report back through channels. The bluest backed
//! implementations live in `manager` and `connection`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::endpoints::Endpoint;
use crate::core::bluetooth::types::{Advertisement, PeripheralAddress};
use crate::error::{Capability, Result};

/// Host capability query consulted before scanning or connecting
pub trait Authorization: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Authorization for hosts without a runtime permission model
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl Authorization for AlwaysGranted {
    fn is_granted(&self, _capability: Capability) -> bool {
        true
    }
}

/// Events produced by an active scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Advertisement(Advertisement),
    /// The scan failed and will not produce further advertisements
    Failed(i32),
}

#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Begin scanning. `service` restricts results to peripherals advertising it.
    async fn start_scan(
        &self,
        service: Option<Uuid>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<()>;

    /// Halt the active scan. Calling it with no active scan is a no-op.
    async fn stop_scan(&self) -> Result<()>;
}

/// Events reported by an open link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    ServicesDiscovered,
    ServiceDiscoveryFailed(i32),
    ReadComplete {
        endpoint: Endpoint,
        result: std::result::Result<Vec<u8>, i32>,
    },
    WriteComplete {
        endpoint: Endpoint,
        result: std::result::Result<(), i32>,
    },
    /// The transport could not tear the connection down
    DisconnectFailed(i32),
    Disconnected,
}

/// Sender half handed to a link, tagged with the session it belongs to
#[derive(Debug, Clone)]
pub struct LinkEvents {
    session: u64,
    tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
}

impl LinkEvents {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<(u64, LinkEvent)>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Deliver an event. Returns false once the session loop is gone.
    pub fn send(&self, event: LinkEvent) -> bool {
        self.tx.send((self.session, event)).is_ok()
    }
}

#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Resolve `address` and start connecting. Fails with `DeviceNotFound`
    /// when the address cannot be resolved; there is no retry.
    async fn open(&self, address: &PeripheralAddress, events: LinkEvents) -> Result<Box<dyn Link>>;
}

/// One transport connection. Every request returns the transport's immediate
/// acknowledgement; completion arrives later as a [`LinkEvent`].
pub trait Link: Send + Sync {
    fn discover_services(&self) -> Result<()>;
    fn read(&self, endpoint: Endpoint) -> Result<()>;
    fn write(&self, endpoint: Endpoint, payload: Vec<u8>) -> Result<()>;
    /// Request teardown. `LinkEvent::Disconnected` confirms it,
    /// `LinkEvent::DisconnectFailed` reports a failed attempt.
    fn disconnect(&self) -> Result<()>;
    /// Release every resource held by the link. No further events are sent.
    fn close(&self);
}
