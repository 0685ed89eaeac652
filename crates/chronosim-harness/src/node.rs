//! One simulated host running a scenario driver.
//!
//! `SimNode` is the runtime half of the driver: it executes the driver's
//! actions against a turmoil UDP socket and feeds network input back in as
//! events. It also plays the sync session for its host, in the simplest form
//! that keeps the driver honest:
//!
//! - Publishing stores the packet locally and announces the new sequence
//!   number to every peer with an `Update` datagram
//! - Fetching sends an `Interest` to the session's origin host and waits one
//!   interest lifetime for the `Data` reply, retrying up to the driver's retry
//!   budget before reporting `FetchFailed`
//!
//! There is no digest exchange, so a lost `Update` is never recovered.

use std::{
    collections::{HashMap, VecDeque},
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use chronosim_core::{Data, Environment, MissingDataInfo, Name, SeqNo};
use chronosim_driver::{
    DriverError, DriverStats, ScenarioAction, ScenarioDriver, ScenarioEvent, Timer,
};
use thiserror::Error;
use tokio::time::Instant;
use turmoil::net::UdpSocket;

use crate::{
    event_loop::EventLoop,
    wire::{MAX_DATAGRAM_SIZE, SimMessage, WireError},
};

/// UDP port every simulated host listens on.
pub const SYNC_PORT: u16 = 6363;

/// Errors that stop a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Socket error from the simulated network.
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver rejected an event.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// An outgoing message could not be encoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The driver published before opening its session.
    #[error("publish without an open session")]
    NoSession,
}

/// Per-node runtime settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This host's name.
    pub host: String,
    /// Every other host in the sync group.
    pub peers: Vec<String>,
    /// How long to wait for a `Data` reply before retrying.
    pub interest_lifetime: Duration,
    /// Virtual time to run for.
    pub run_for: Duration,
    /// Use `StartPeriodic` instead of `Start`.
    pub periodic: bool,
}

/// One publication by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Virtual time of the publish.
    pub at: Duration,
    /// Sequence number in this node's session.
    pub seq: SeqNo,
    /// Payload as text.
    pub payload: String,
}

/// One packet delivered to the print handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRecord {
    /// Virtual time of the delivery.
    pub at: Duration,
    /// Publisher identity.
    pub peer: String,
    /// Payload as text.
    pub content: String,
    /// Full data name.
    pub name: Name,
}

/// What one node did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    /// Host name.
    pub host: String,
    /// Message budget drawn by the driver.
    pub message_budget: u64,
    /// Session name, once opened.
    pub session: Option<Name>,
    /// Publications in order.
    pub published: Vec<PublishRecord>,
    /// Deliveries in order.
    pub received: Vec<ReceiveRecord>,
    /// Driver counters at the end of the run.
    pub stats: DriverStats,
    /// Interests sent, retransmissions included.
    pub interests_sent: u64,
    /// Datagrams that failed to decode.
    pub decode_errors: u64,
    /// Datagrams dropped for naming an unknown host or not matching the
    /// fetch they answer.
    pub rejected: u64,
}

/// Timers owned by the node runtime.
#[derive(Debug, Clone, Copy)]
enum NodeTimer {
    Driver(Timer),
    InterestTimeout(u64),
}

#[derive(Debug)]
struct PendingFetch {
    session: Name,
    seq: SeqNo,
    retries_left: u32,
    origin: String,
}

/// The sync session this node publishes into.
#[derive(Debug)]
struct LocalSession {
    name: Name,
    store: Vec<Data>,
}

/// Scenario driver bound to a turmoil host.
pub struct SimNode<E: Environment> {
    config: NodeConfig,
    driver: ScenarioDriver<E>,
    socket: UdpSocket,
    timers: EventLoop<NodeTimer>,
    session: Option<LocalSession>,
    /// Session name to the host that announced it.
    origins: HashMap<Name, String>,
    pending: HashMap<u64, PendingFetch>,
    next_request_id: u64,
    report: NodeReport,
}

impl<E: Environment> SimNode<E> {
    /// Bind this host's socket.
    ///
    /// Must be called from inside a turmoil host or client.
    pub async fn bind(config: NodeConfig, driver: ScenarioDriver<E>) -> Result<Self, NodeError> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, SYNC_PORT))).await?;

        let report = NodeReport {
            host: config.host.clone(),
            message_budget: driver.message_budget(),
            session: None,
            published: Vec::new(),
            received: Vec::new(),
            stats: DriverStats::default(),
            interests_sent: 0,
            decode_errors: 0,
            rejected: 0,
        };

        Ok(Self {
            config,
            driver,
            socket,
            timers: EventLoop::new(),
            session: None,
            origins: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: 0,
            report,
        })
    }

    /// Initialize and start the driver, then process timers and datagrams
    /// until `run_for` of virtual time has passed.
    pub async fn run(mut self) -> Result<NodeReport, NodeError> {
        let started = Instant::now();
        let run_for = self.config.run_for;
        let start = if self.config.periodic {
            ScenarioEvent::StartPeriodic
        } else {
            ScenarioEvent::Start
        };

        self.dispatch(ScenarioEvent::Initialize).await?;
        self.dispatch(start).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let elapsed = started.elapsed();
            if elapsed >= run_for {
                break;
            }

            // Timers fire at their scheduled instant so chained delays stay exact.
            while let Some((_, timer)) = self.timers.pop_due(elapsed) {
                self.on_timer(timer).await?;
            }
            self.timers.advance_to(elapsed);

            let wake_at = self.timers.next_deadline().map_or(run_for, |at| at.min(run_for));
            let received = tokio::select! {
                received = self.socket.recv_from(&mut buf) => Some(received?),
                () = tokio::time::sleep_until(started + wake_at) => None,
            };

            if let Some((len, from)) = received {
                self.timers.advance_to(started.elapsed());
                self.on_datagram(&buf[..len], from).await?;
            }
        }

        self.report.stats = self.driver.stats();
        tracing::info!(
            published = self.report.published.len(),
            received = self.report.received.len(),
            fetch_failures = self.report.stats.fetch_failures,
            "node finished"
        );
        Ok(self.report)
    }

    /// Feed one event to the driver, plus any events its actions produce.
    async fn dispatch(&mut self, event: ScenarioEvent) -> Result<(), NodeError> {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let actions = match self.driver.handle(event) {
                Ok(actions) => actions,
                Err(e) if !e.is_fatal() => {
                    tracing::debug!(error = %e, "driver ignored event");
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            for action in actions {
                self.execute(action, &mut queue).await?;
            }
        }

        Ok(())
    }

    async fn execute(
        &mut self,
        action: ScenarioAction,
        queue: &mut VecDeque<ScenarioEvent>,
    ) -> Result<(), NodeError> {
        match action {
            ScenarioAction::OpenSession { sync_prefix, routable_user_prefix } => {
                let session_no = u64::try_from(self.timers.now().as_millis()).unwrap_or(u64::MAX);
                let name = routable_user_prefix.append_number(session_no);
                tracing::debug!(%sync_prefix, session = %name, "sync session opened");

                self.report.session = Some(name.clone());
                self.session = Some(LocalSession { name, store: Vec::new() });
            },

            ScenarioAction::Schedule { delay, timer } => {
                self.timers.schedule_once(delay, NodeTimer::Driver(timer));
            },

            ScenarioAction::Publish { payload, freshness } => {
                let session = self.session.as_mut().ok_or(NodeError::NoSession)?;
                let seq = session.store.len() as SeqNo + 1;
                let name = session.name.clone().append_number(seq);
                session.store.push(Data::new(name, payload.clone(), freshness));

                let update = SimMessage::Update {
                    origin: self.config.host.clone(),
                    updates: vec![MissingDataInfo::new(session.name.clone(), seq, seq)],
                };

                self.report.published.push(PublishRecord {
                    at: self.timers.now(),
                    seq,
                    payload: String::from_utf8_lossy(&payload).into_owned(),
                });

                let bytes = update.encode()?;
                for peer in &self.config.peers {
                    self.send_to_host(peer, &bytes).await;
                }
            },

            ScenarioAction::Fetch { session, seq, retries } => {
                let Some(origin) = self.origins.get(&session).cloned() else {
                    tracing::warn!(%session, seq, "no origin known for session");
                    queue.push_back(ScenarioEvent::FetchFailed { session, seq });
                    return Ok(());
                };

                let request_id = self.next_request_id;
                self.next_request_id += 1;

                self.send_interest(request_id, &origin, &session, seq).await?;
                self.pending
                    .insert(request_id, PendingFetch { session, seq, retries_left: retries, origin });
                self.timers
                    .schedule_once(self.config.interest_lifetime, NodeTimer::InterestTimeout(request_id));
            },

            ScenarioAction::Deliver(received) => {
                self.report.received.push(ReceiveRecord {
                    at: self.timers.now(),
                    peer: received.peer,
                    content: received.content,
                    name: received.name,
                });
            },
        }

        Ok(())
    }

    async fn on_timer(&mut self, timer: NodeTimer) -> Result<(), NodeError> {
        match timer {
            NodeTimer::Driver(timer) => self.dispatch(ScenarioEvent::TimerFired(timer)).await,
            NodeTimer::InterestTimeout(request_id) => self.on_interest_timeout(request_id).await,
        }
    }

    async fn on_interest_timeout(&mut self, request_id: u64) -> Result<(), NodeError> {
        let Some(pending) = self.pending.get_mut(&request_id) else {
            // Already answered.
            return Ok(());
        };

        if pending.retries_left > 0 {
            pending.retries_left -= 1;
            let (origin, session, seq) = (pending.origin.clone(), pending.session.clone(), pending.seq);
            tracing::debug!(%session, seq, "interest timed out, retrying");

            self.send_interest(request_id, &origin, &session, seq).await?;
            self.timers
                .schedule_once(self.config.interest_lifetime, NodeTimer::InterestTimeout(request_id));
            return Ok(());
        }

        match self.pending.remove(&request_id) {
            Some(PendingFetch { session, seq, .. }) => {
                self.dispatch(ScenarioEvent::FetchFailed { session, seq }).await
            },
            None => Ok(()),
        }
    }

    async fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Result<(), NodeError> {
        let message = match SimMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%from, error = %e, "dropping undecodable datagram");
                self.report.decode_errors += 1;
                return Ok(());
            },
        };

        match message {
            SimMessage::Update { origin, updates } => {
                if !self.config.peers.contains(&origin) {
                    tracing::warn!(%from, %origin, "dropping update from unknown host");
                    self.report.rejected += 1;
                    return Ok(());
                }
                for info in &updates {
                    self.origins.insert(info.session.clone(), origin.clone());
                }
                self.dispatch(ScenarioEvent::SyncUpdate(updates)).await
            },

            SimMessage::Interest { request_id, session, seq } => {
                let reply = self
                    .session
                    .as_ref()
                    .filter(|local| local.name == session)
                    .and_then(|local| local.store.get(usize::try_from(seq).ok()?.checked_sub(1)?))
                    .map(|data| SimMessage::Data {
                        request_id,
                        name: data.name.clone(),
                        content: data.content.to_vec(),
                        freshness_ms: u64::try_from(data.freshness.as_millis()).unwrap_or(u64::MAX),
                    });

                match reply {
                    Some(reply) => {
                        let bytes = reply.encode()?;
                        if let Err(e) = self.socket.send_to(&bytes, from).await {
                            tracing::warn!(%from, error = %e, "data reply not sent");
                        }
                    },
                    None => tracing::debug!(%session, seq, "interest for unknown data"),
                }
                Ok(())
            },

            SimMessage::Data { request_id, name, content, freshness_ms } => {
                let Some(pending) = self.pending.get(&request_id) else {
                    tracing::debug!(%name, "late or duplicate data");
                    return Ok(());
                };
                let expected = pending.session.clone().append_number(pending.seq);
                if name != expected {
                    // The fetch stays pending and will time out or be answered.
                    tracing::warn!(%from, %name, %expected, "dropping data for the wrong name");
                    self.report.rejected += 1;
                    return Ok(());
                }
                self.pending.remove(&request_id);
                let data = Data::new(name, content, Duration::from_millis(freshness_ms));
                self.dispatch(ScenarioEvent::DataFetched(data)).await
            },
        }
    }

    async fn send_interest(
        &mut self,
        request_id: u64,
        origin: &str,
        session: &Name,
        seq: SeqNo,
    ) -> Result<(), NodeError> {
        let interest = SimMessage::Interest { request_id, session: session.clone(), seq };
        let bytes = interest.encode()?;
        self.report.interests_sent += 1;
        self.send_to_host(origin, &bytes).await;
        Ok(())
    }

    /// Send one datagram. Failures count as loss.
    async fn send_to_host(&self, host: &str, bytes: &[u8]) {
        let target = SocketAddr::new(turmoil::lookup(host), SYNC_PORT);
        if let Err(e) = self.socket.send_to(bytes, target).await {
            tracing::warn!(host, error = %e, "datagram not sent");
        }
    }
}
