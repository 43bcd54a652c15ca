//! Session client for a single Neuralyzer light
//!
//! All state lives in one private loop task. Caller commands arrive on a
//! bounded channel, transport events on an unbounded one, and the loop is the
//! only writer of the connection state and the attribute snapshot. Callers
//! observe results through `watch` and `broadcast` channels.
//!
//! Once the link reports discovered services the loop reads color, then
//! intensity, then active status, each read issued from the completion of the
//! previous one. At most one transport operation is in flight at any time:
//! caller requests issued while one is pending are rejected, the automatic
//! reads wait for the gate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::core::bluetooth::commands::LightCommand;
use crate::core::bluetooth::constants::{TRANSPORT_CODE_TIMEOUT, TRANSPORT_CODE_UNKNOWN};
use crate::core::bluetooth::endpoints::{self, Endpoint};
use crate::core::bluetooth::transport::{Authorization, Link, LinkEvent, LinkEvents, LinkTransport};
use crate::core::bluetooth::types::{ConnectionState, DeviceSnapshot, PeripheralAddress, Rgb, Timed};
use crate::error::{Capability, LightError, Result};

const FAULT_CHANNEL_CAPACITY: usize = 64;
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// The order in which attributes are read once the session becomes ready
const READY_READ_CHAIN: [Endpoint; 3] = [Endpoint::Color, Endpoint::Intensity, Endpoint::ActiveStatus];

/// Failures raised inside transport callbacks. They never reach a caller
/// as an error; observers receive them on [`SessionClient::faults`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFault {
    /// Service discovery, teardown, a link request or the watchdog failed.
    /// Discovery and teardown failures also end the session.
    Transport(i32),
    /// A read completed with a payload the endpoint cannot decode
    Decode(LightError),
    ReadFailed { endpoint: Endpoint, code: i32 },
    /// The optimistic value written to the snapshot is left in place
    WriteFailed { endpoint: Endpoint, code: i32 },
}

struct SessionObservers {
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    color: watch::Sender<Timed<Rgb>>,
    intensity: watch::Sender<Timed<u8>>,
    active: watch::Sender<Timed<bool>>,
    faults: broadcast::Sender<SessionFault>,
}

impl SessionObservers {
    fn new(snapshot: DeviceSnapshot) -> Self {
        Self {
            state: watch::channel(ConnectionState::Unknown).0,
            transitions: broadcast::channel(TRANSITION_CHANNEL_CAPACITY).0,
            color: watch::channel(snapshot.color).0,
            intensity: watch::channel(snapshot.intensity).0,
            active: watch::channel(snapshot.active).0,
            faults: broadcast::channel(FAULT_CHANNEL_CAPACITY).0,
        }
    }
}

enum SessionCommand {
    Connect {
        address: PeripheralAddress,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Write {
        command: LightCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    Read {
        endpoint: Endpoint,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the session loop. Dropping every handle stops the loop and
/// closes the link.
pub struct SessionClient {
    commands: mpsc::Sender<SessionCommand>,
    observers: Arc<SessionObservers>,
    task: JoinHandle<()>,
}

impl SessionClient {
    /// Spawns the session loop on the current tokio runtime
    pub fn new(
        transport: Arc<dyn LinkTransport>,
        authorization: Arc<dyn Authorization>,
        config: SessionConfig,
    ) -> Self {
        let snapshot = DeviceSnapshot::default();
        let observers = Arc::new(SessionObservers::new(snapshot));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (watchdog_tx, watchdog_rx) = mpsc::unbounded_channel();

        let session_loop = SessionLoop {
            transport,
            authorization,
            operation_timeout: config.operation_timeout(),
            observers: observers.clone(),
            link: None,
            session: 0,
            events_tx,
            watchdog_tx,
            in_flight: None,
            op_seq: 0,
            read_chain: VecDeque::new(),
            snapshot,
        };
        let task = tokio::spawn(session_loop.run(commands_rx, events_rx, watchdog_rx));

        Self {
            commands: commands_tx,
            observers,
            task,
        }
    }

    /// Open a session with `address`, superseding any current one
    pub async fn connect(&self, address: impl Into<PeripheralAddress>) -> Result<()> {
        let address = address.into();
        self.request(|reply| SessionCommand::Connect { address, reply })
            .await
    }

    /// Request teardown. The state becomes `Disconnected` once the
    /// transport confirms.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Disconnect { reply }).await
    }

    pub async fn set_color(&self, r: u8, g: u8, b: u8) -> Result<()> {
        self.write(LightCommand::SetColor(Rgb::new(r, g, b))).await
    }

    /// Levels are truncated to a byte, never clamped. Callers keep them in 0..=3.
    pub async fn set_intensity(&self, level: i32) -> Result<()> {
        self.write(LightCommand::SetIntensity(level)).await
    }

    pub async fn set_active_state(&self, active: bool) -> Result<()> {
        self.write(LightCommand::SetActive(active)).await
    }

    pub async fn write(&self, command: LightCommand) -> Result<()> {
        self.request(|reply| SessionCommand::Write { command, reply })
            .await
    }

    /// Issue a single read. It does not trigger any follow-up reads.
    pub async fn request_read(&self, endpoint: Endpoint) -> Result<()> {
        self.request(|reply| SessionCommand::Read { endpoint, reply })
            .await
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.observers.state.subscribe()
    }

    /// Every state change from now on, in order
    pub fn state_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.observers.transitions.subscribe()
    }

    pub fn color(&self) -> watch::Receiver<Timed<Rgb>> {
        self.observers.color.subscribe()
    }

    pub fn intensity(&self) -> watch::Receiver<Timed<u8>> {
        self.observers.intensity.subscribe()
    }

    pub fn active(&self) -> watch::Receiver<Timed<bool>> {
        self.observers.active.subscribe()
    }

    pub fn faults(&self) -> broadcast::Receiver<SessionFault> {
        self.observers.faults.subscribe()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            color: *self.observers.color.borrow(),
            intensity: *self.observers.intensity.borrow(),
            active: *self.observers.active.borrow(),
        }
    }

    /// Stop the loop, close the link and wait for the task to finish
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            error!("Session loop finished with a join error: {:?}", e);
        }
    }

    async fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> SessionCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| LightError::SessionClosed)?;
        reply_rx.await.map_err(|_| LightError::SessionClosed)?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
struct PendingOperation {
    kind: OperationKind,
    endpoint: Endpoint,
    seq: u64,
}

struct SessionLoop {
    transport: Arc<dyn LinkTransport>,
    authorization: Arc<dyn Authorization>,
    operation_timeout: Option<Duration>,
    observers: Arc<SessionObservers>,
    link: Option<Box<dyn Link>>,
    /// Id of the current session, used to drop events of superseded links
    session: u64,
    events_tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
    watchdog_tx: mpsc::UnboundedSender<u64>,
    in_flight: Option<PendingOperation>,
    op_seq: u64,
    read_chain: VecDeque<Endpoint>,
    snapshot: DeviceSnapshot,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
        mut watchdog: mpsc::UnboundedReceiver<u64>,
    ) {
        info!("Session loop started.");
        loop {
            // Transport events first: a command never observes a state older
            // than the events already delivered.
            tokio::select! {
                biased;
                Some((session, event)) = events.recv() => self.handle_link_event(session, event),
                Some(seq) = watchdog.recv() => self.handle_watchdog(seq),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        if let Some(link) = self.link.take() {
            link.close();
        }
        info!("Session loop stopped.");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { address, reply } => {
                let result = self.connect(address).await;
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            SessionCommand::Write { command, reply } => {
                let _ = reply.send(self.write(command));
            }
            SessionCommand::Read { endpoint, reply } => {
                let result = self.ensure_can_operate().and_then(|()| self.issue_read(endpoint));
                let _ = reply.send(result);
            }
        }
    }

    async fn connect(&mut self, address: PeripheralAddress) -> Result<()> {
        self.ensure_permission()?;

        if let Some(link) = self.link.take() {
            info!("Tearing down session {} before connecting to {}", self.session, address);
            link.close();
            self.reset_operations();
            self.transition(ConnectionState::Disconnected);
        }

        self.session += 1;
        let events = LinkEvents::new(self.session, self.events_tx.clone());
        info!("Initiating connection to {} (session {})", address, self.session);
        let link = self.transport.open(&address, events).await.map_err(|e| {
            error!("Failed to open link to {}: {}", address, e);
            e
        })?;

        self.link = Some(link);
        self.snapshot = DeviceSnapshot::default();
        for endpoint in Endpoint::ALL {
            self.publish_field(endpoint);
        }
        self.transition(ConnectionState::Connecting);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.ensure_permission()?;
        match &self.link {
            Some(link) => {
                info!("Disconnecting session {}", self.session);
                link.disconnect()
            }
            None => {
                info!("No active session to disconnect");
                Ok(())
            }
        }
    }

    fn write(&mut self, command: LightCommand) -> Result<()> {
        self.ensure_can_operate()?;
        let endpoint = command.endpoint();
        let link = self.link.as_ref().ok_or(LightError::NotReady(self.state()))?;

        info!("Sending command to light: {:?}", command);
        link.write(endpoint, command.to_bytes())?;
        self.begin_operation(OperationKind::Write, endpoint);

        command.apply_optimistic(&mut self.snapshot);
        self.publish_field(endpoint);
        Ok(())
    }

    fn handle_link_event(&mut self, session: u64, event: LinkEvent) {
        if session != self.session || self.link.is_none() {
            warn!("Dropping {:?} from stale session {}", event, session);
            return;
        }
        debug!("Session {} event: {:?}", session, event);

        match event {
            LinkEvent::Connected => {
                info!("Successful connect to device, discovering services...");
                self.transition(ConnectionState::Connected);
                if let Some(Err(e)) = self.link.as_ref().map(|link| link.discover_services()) {
                    error!("Failed to request service discovery: {}", e);
                    self.abort_link(transport_code(&e));
                }
            }
            LinkEvent::ServicesDiscovered => {
                let state = self.state();
                if state != ConnectionState::Connected {
                    warn!("Ignoring service discovery result while {}", state);
                    return;
                }
                info!("Successfully discovered services");
                self.transition(ConnectionState::Ready);
                self.read_chain = READY_READ_CHAIN.into_iter().collect();
                self.pump_read_chain();
            }
            LinkEvent::ServiceDiscoveryFailed(code) => {
                error!("Service discovery failed with code {}", code);
                self.abort_link(code);
            }
            LinkEvent::DisconnectFailed(code) => {
                error!("Disconnect failed with code {}, releasing the link", code);
                self.abort_link(code);
            }
            LinkEvent::ReadComplete { endpoint, result } => {
                self.complete_operation(OperationKind::Read, endpoint);
                match result {
                    Ok(payload) => {
                        debug!("Read {}: {:?}", endpoint, payload);
                        match self.apply_read(endpoint, &payload) {
                            Ok(()) => self.pump_read_chain(),
                            Err(e) => {
                                error!("Failed to decode {}: {}", endpoint, e);
                                self.read_chain.clear();
                                self.fault(SessionFault::Decode(e));
                            }
                        }
                    }
                    Err(code) => {
                        error!("Read of {} failed with code {}", endpoint, code);
                        self.read_chain.clear();
                        self.fault(SessionFault::ReadFailed { endpoint, code });
                    }
                }
            }
            LinkEvent::WriteComplete { endpoint, result } => {
                self.complete_operation(OperationKind::Write, endpoint);
                match result {
                    Ok(()) => debug!("Write to {} acknowledged", endpoint),
                    Err(code) => {
                        warn!("Write to {} failed with code {}", endpoint, code);
                        self.fault(SessionFault::WriteFailed { endpoint, code });
                    }
                }
                self.pump_read_chain();
            }
            LinkEvent::Disconnected => {
                info!("Session {} disconnected", session);
                if let Some(link) = self.link.take() {
                    link.close();
                }
                self.reset_operations();
                self.transition(ConnectionState::Disconnected);
            }
        }
    }

    /// Publish `code`, release the link and settle in `Disconnected`
    fn abort_link(&mut self, code: i32) {
        self.fault(SessionFault::Transport(code));
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.reset_operations();
        self.transition(ConnectionState::Disconnected);
    }

    fn handle_watchdog(&mut self, seq: u64) {
        let Some(pending) = self.in_flight else {
            return;
        };
        if pending.seq != seq {
            return;
        }
        warn!(
            "{:?} of {} did not complete in time, releasing the operation gate",
            pending.kind, pending.endpoint
        );
        self.in_flight = None;
        self.read_chain.clear();
        self.fault(SessionFault::Transport(TRANSPORT_CODE_TIMEOUT));
    }

    fn apply_read(&mut self, endpoint: Endpoint, payload: &[u8]) -> Result<()> {
        match endpoint {
            Endpoint::Color => self.snapshot.color = Timed::now(endpoints::decode_color(payload)?),
            Endpoint::Intensity => {
                self.snapshot.intensity = Timed::now(endpoints::decode_intensity(payload)?)
            }
            Endpoint::ActiveStatus => {
                self.snapshot.active = Timed::now(endpoints::decode_active(payload)?)
            }
        }
        self.publish_field(endpoint);
        Ok(())
    }

    fn pump_read_chain(&mut self) {
        if self.in_flight.is_some() || self.state() != ConnectionState::Ready {
            return;
        }
        if let Some(endpoint) = self.read_chain.pop_front() {
            if let Err(e) = self.issue_read(endpoint) {
                error!("Failed to read {}: {}", endpoint, e);
                self.read_chain.clear();
                self.fault(SessionFault::Transport(transport_code(&e)));
            }
        }
    }

    fn issue_read(&mut self, endpoint: Endpoint) -> Result<()> {
        let link = self.link.as_ref().ok_or(LightError::NotReady(self.state()))?;
        link.read(endpoint)?;
        self.begin_operation(OperationKind::Read, endpoint);
        Ok(())
    }

    fn begin_operation(&mut self, kind: OperationKind, endpoint: Endpoint) {
        self.op_seq += 1;
        let seq = self.op_seq;
        self.in_flight = Some(PendingOperation { kind, endpoint, seq });

        if let Some(timeout) = self.operation_timeout {
            let watchdog_tx = self.watchdog_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = watchdog_tx.send(seq);
            });
        }
    }

    fn complete_operation(&mut self, kind: OperationKind, endpoint: Endpoint) {
        match self.in_flight {
            Some(pending) if pending.kind == kind && pending.endpoint == endpoint => {
                self.in_flight = None;
            }
            other => warn!(
                "{:?} completion for {} does not match the pending operation {:?}",
                kind, endpoint, other
            ),
        }
    }

    fn reset_operations(&mut self) {
        self.in_flight = None;
        self.read_chain.clear();
    }

    fn ensure_permission(&self) -> Result<()> {
        if self.authorization.is_granted(Capability::Connect) {
            Ok(())
        } else {
            warn!("Connect permission missing");
            Err(LightError::PermissionDenied(Capability::Connect))
        }
    }

    fn ensure_can_operate(&self) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Ready {
            return Err(LightError::NotReady(state));
        }
        if self.in_flight.is_some() {
            return Err(LightError::OperationRejectedBusy);
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.observers.state.borrow()
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.observers.state.send_replace(next);
        if previous != next {
            info!("Connection state: {} -> {}", previous, next);
            let _ = self.observers.transitions.send(next);
        }
    }

    fn publish_field(&self, endpoint: Endpoint) {
        match endpoint {
            Endpoint::Color => {
                self.observers.color.send_replace(self.snapshot.color);
            }
            Endpoint::Intensity => {
                self.observers.intensity.send_replace(self.snapshot.intensity);
            }
            Endpoint::ActiveStatus => {
                self.observers.active.send_replace(self.snapshot.active);
            }
        }
    }

    fn fault(&self, fault: SessionFault) {
        let _ = self.observers.faults.send(fault);
    }
}

fn transport_code(error: &LightError) -> i32 {
    match error {
        LightError::TransportFailure(code) => *code,
        _ => TRANSPORT_CODE_UNKNOWN,
    }
}
