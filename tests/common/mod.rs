//! In-memory transports for driving the scanner and the session client.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use neuralyzer_light::core::bluetooth::{
    Advertisement, Authorization, ConnectionState, Endpoint, Link, LinkEvent, LinkEvents,
    LinkTransport, PeripheralAddress, ScanEvent, ScanTransport, SessionClient,
};
use neuralyzer_light::{Capability, LightError, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct Permissions {
    pub scan: bool,
    pub connect: bool,
}

impl Permissions {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self { scan: true, connect: true })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self { scan: false, connect: false })
    }
}

impl Authorization for Permissions {
    fn is_granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scan => self.scan,
            Capability::Connect => self.connect,
        }
    }
}

#[derive(Default)]
pub struct MockScanTransport {
    events: Mutex<Option<mpsc::UnboundedSender<ScanEvent>>>,
    filters: Mutex<Vec<Option<Uuid>>>,
    stops: AtomicUsize,
    start_error: Mutex<Option<LightError>>,
}

impl MockScanTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advertise(&self, address: &str) -> bool {
        self.advertise_with_rssi(address, Some(-50))
    }

    pub fn advertise_with_rssi(&self, address: &str, rssi: Option<i16>) -> bool {
        self.send(ScanEvent::Advertisement(Advertisement {
            address: PeripheralAddress::new(address),
            name: Some("Neuralyzer".to_string()),
            rssi,
        }))
    }

    pub fn fail(&self, code: i32) -> bool {
        self.send(ScanEvent::Failed(code))
    }

    /// Make the next `start_scan` fail with `error`
    pub fn reject_next_start(&self, error: LightError) {
        *self.start_error.lock().unwrap() = Some(error);
    }

    pub fn filters(&self) -> Vec<Option<Uuid>> {
        self.filters.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn send(&self, event: ScanEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ScanTransport for MockScanTransport {
    async fn start_scan(
        &self,
        service: Option<Uuid>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<()> {
        if let Some(error) = self.start_error.lock().unwrap().take() {
            return Err(error);
        }
        self.filters.lock().unwrap().push(service);
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = None;
        Ok(())
    }
}

/// Every request a session made of its link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Open(String),
    DiscoverServices,
    Read(Endpoint),
    Write(Endpoint, Vec<u8>),
    Disconnect,
    Close(u64),
}

pub struct MockLinkTransport {
    known: HashSet<String>,
    ops: mpsc::UnboundedSender<Op>,
    links: Mutex<Vec<LinkEvents>>,
}

impl MockLinkTransport {
    pub fn new(known: &[&str]) -> (Arc<Self>, mpsc::UnboundedReceiver<Op>) {
        let (ops, ops_rx) = mpsc::unbounded_channel();
        let transport = Self {
            known: known.iter().map(|address| address.to_string()).collect(),
            ops,
            links: Mutex::new(Vec::new()),
        };
        (Arc::new(transport), ops_rx)
    }

    /// Event sender of the most recently opened link
    pub fn events(&self) -> LinkEvents {
        self.links
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no link opened")
    }

    pub fn emit(&self, event: LinkEvent) {
        assert!(self.events().send(event), "session loop is gone");
    }
}

#[async_trait]
impl LinkTransport for MockLinkTransport {
    async fn open(&self, address: &PeripheralAddress, events: LinkEvents) -> Result<Box<dyn Link>> {
        if !self.known.contains(address.as_str()) {
            return Err(LightError::DeviceNotFound(address.clone()));
        }
        let _ = self.ops.send(Op::Open(address.to_string()));
        let session = events.session();
        self.links.lock().unwrap().push(events);
        Ok(Box::new(MockLink {
            session,
            ops: self.ops.clone(),
        }))
    }
}

struct MockLink {
    session: u64,
    ops: mpsc::UnboundedSender<Op>,
}

impl Link for MockLink {
    fn discover_services(&self) -> Result<()> {
        let _ = self.ops.send(Op::DiscoverServices);
        Ok(())
    }

    fn read(&self, endpoint: Endpoint) -> Result<()> {
        let _ = self.ops.send(Op::Read(endpoint));
        Ok(())
    }

    fn write(&self, endpoint: Endpoint, payload: Vec<u8>) -> Result<()> {
        let _ = self.ops.send(Op::Write(endpoint, payload));
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let _ = self.ops.send(Op::Disconnect);
        Ok(())
    }

    fn close(&self) {
        let _ = self.ops.send(Op::Close(self.session));
    }
}

pub async fn next_op(ops: &mut mpsc::UnboundedReceiver<Op>) -> Op {
    timeout(WAIT, ops.recv())
        .await
        .expect("timed out waiting for a link operation")
        .expect("operation channel closed")
}

pub async fn wait_for_state(client: &SessionClient, expected: ConnectionState) {
    let mut state = client.connection_state();
    timeout(WAIT, state.wait_for(|state| *state == expected))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}

/// Connects to `address` and drives the link up to `Ready`. The automatic
/// color read is left in flight.
pub async fn connect_ready(
    client: &SessionClient,
    transport: &MockLinkTransport,
    ops: &mut mpsc::UnboundedReceiver<Op>,
    address: &str,
) {
    client.connect(address).await.expect("connect");
    assert_eq!(next_op(ops).await, Op::Open(address.to_string()));
    transport.emit(LinkEvent::Connected);
    assert_eq!(next_op(ops).await, Op::DiscoverServices);
    transport.emit(LinkEvent::ServicesDiscovered);
    wait_for_state(client, ConnectionState::Ready).await;
    assert_eq!(next_op(ops).await, Op::Read(Endpoint::Color));
}

/// Answers the automatic read chain with the given payloads
pub async fn complete_read_chain(
    client: &SessionClient,
    transport: &MockLinkTransport,
    ops: &mut mpsc::UnboundedReceiver<Op>,
    color: [u8; 3],
    intensity: u8,
) {
    transport.emit(LinkEvent::ReadComplete {
        endpoint: Endpoint::Color,
        result: Ok(color.to_vec()),
    });
    assert_eq!(next_op(ops).await, Op::Read(Endpoint::Intensity));
    transport.emit(LinkEvent::ReadComplete {
        endpoint: Endpoint::Intensity,
        result: Ok(vec![intensity]),
    });
    assert_eq!(next_op(ops).await, Op::Read(Endpoint::ActiveStatus));
    transport.emit(LinkEvent::ReadComplete {
        endpoint: Endpoint::ActiveStatus,
        result: Ok(vec![1]),
    });
    let mut active = client.active();
    timeout(WAIT, active.wait_for(|active| active.value))
        .await
        .expect("timed out waiting for the active read")
        .expect("active channel closed");
}
