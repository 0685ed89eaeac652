//! Scenario driver state machine.
//!
//! The driver owns the session prefixes, the message budget and every live
//! publish chain. It never touches a clock or a socket: each call to
//! [`ScenarioDriver::handle`] returns the actions the runtime must carry out.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use chronosim_core::{Data, Environment, MissingDataInfo, Name, SeqNo};

use crate::{
    chain::{ChainId, ChainStep, PublishChain},
    config::DriverConfig,
    error::DriverError,
    event::{ReceivedData, ScenarioAction, ScenarioEvent, Timer},
    fetch::{FetchQueue, FetchRequest},
};

/// Counters describing what the driver has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Data packets published.
    pub published: u64,
    /// Sync update batches received.
    pub updates: u64,
    /// Fetch actions emitted.
    pub fetches_issued: u64,
    /// Fetched packets handed to the print handler.
    pub delivered: u64,
    /// Fetches that exhausted their retries.
    pub fetch_failures: u64,
}

/// Drives one sync session through a publish/fetch scenario.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for randomness
pub struct ScenarioDriver<E: Environment> {
    env: E,
    config: DriverConfig,

    sync_prefix: Name,
    user_prefix: Name,
    routing_prefix: Name,
    /// Set by `Initialize`; its presence means the session is open.
    routable_user_prefix: Option<Name>,

    /// Drawn once at construction.
    message_budget: u64,

    chains: BTreeMap<ChainId, PublishChain>,
    next_chain_id: u64,

    fetches: FetchQueue,
    stats: DriverStats,
}

impl<E: Environment> ScenarioDriver<E> {
    /// Create a driver and draw its message budget.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Config` if the configuration is invalid.
    pub fn new(env: E, config: DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;

        let message_budget = config.messages.sample(&env);
        let fetches = FetchQueue::new(config.max_outstanding_fetches);

        Ok(Self {
            env,
            config,
            sync_prefix: Name::new(),
            user_prefix: Name::new(),
            routing_prefix: Name::new(),
            routable_user_prefix: None,
            message_budget,
            chains: BTreeMap::new(),
            next_chain_id: 0,
            fetches,
            stats: DriverStats::default(),
        })
    }

    /// Set the sync group prefix.
    pub fn set_sync_prefix(&mut self, prefix: Name) -> Result<(), DriverError> {
        self.ensure_configurable()?;
        self.sync_prefix = prefix;
        Ok(())
    }

    /// Set this node's user prefix.
    pub fn set_user_prefix(&mut self, prefix: Name) -> Result<(), DriverError> {
        self.ensure_configurable()?;
        self.user_prefix = prefix;
        Ok(())
    }

    /// Set the routing prefix placed in front of the user prefix.
    pub fn set_routing_prefix(&mut self, prefix: Name) -> Result<(), DriverError> {
        self.ensure_configurable()?;
        self.routing_prefix = prefix;
        Ok(())
    }

    /// Number of messages each publish chain emits.
    pub fn message_budget(&self) -> u64 {
        self.message_budget
    }

    /// Sync group prefix.
    pub fn sync_prefix(&self) -> &Name {
        &self.sync_prefix
    }

    /// User prefix.
    pub fn user_prefix(&self) -> &Name {
        &self.user_prefix
    }

    /// Routing prefix.
    pub fn routing_prefix(&self) -> &Name {
        &self.routing_prefix
    }

    /// Routable user prefix, once initialized.
    pub fn routable_user_prefix(&self) -> Option<&Name> {
        self.routable_user_prefix.as_ref()
    }

    /// True once `Initialize` has been handled.
    pub fn is_initialized(&self) -> bool {
        self.routable_user_prefix.is_some()
    }

    /// Publish chains that have not reached their budget.
    pub fn active_chains(&self) -> usize {
        self.chains.len()
    }

    /// Fetches in flight.
    pub fn outstanding_fetches(&self) -> usize {
        self.fetches.outstanding()
    }

    /// Announced ranges still waiting for fetch slots.
    pub fn deferred_ranges(&self) -> usize {
        self.fetches.backlog_len()
    }

    /// Activity counters.
    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the event is not valid in the current state.
    pub fn handle(&mut self, event: ScenarioEvent) -> Result<Vec<ScenarioAction>, DriverError> {
        match event {
            ScenarioEvent::Initialize => self.handle_initialize(),
            ScenarioEvent::Start => Ok(vec![self.start_chain()]),
            ScenarioEvent::StartPeriodic | ScenarioEvent::TimerFired(Timer::PeriodicRearm) => {
                Ok(self.arm_periodic())
            },
            ScenarioEvent::TimerFired(Timer::Publish(chain_id)) => self.handle_publish_step(chain_id),
            ScenarioEvent::SyncUpdate(updates) => Ok(self.handle_sync_update(updates)),
            ScenarioEvent::DataFetched(data) => Ok(self.handle_data(data)),
            ScenarioEvent::FetchFailed { session, seq } => {
                Ok(self.handle_fetch_failed(&session, seq))
            },
        }
    }

    fn ensure_configurable(&self) -> Result<(), DriverError> {
        if self.is_initialized() {
            return Err(DriverError::AlreadyInitialized);
        }
        Ok(())
    }

    fn next_delay(&self) -> Duration {
        Duration::from_millis(self.config.delay_ms.sample(&self.env))
    }

    fn handle_initialize(&mut self) -> Result<Vec<ScenarioAction>, DriverError> {
        self.ensure_configurable()?;

        let routable = self.routing_prefix.concat(&self.user_prefix);
        tracing::info!(
            sync_prefix = %self.sync_prefix,
            routable_user_prefix = %routable,
            message_budget = self.message_budget,
            "ChronoSync instance initialized"
        );
        self.routable_user_prefix = Some(routable.clone());

        Ok(vec![ScenarioAction::OpenSession {
            sync_prefix: self.sync_prefix.clone(),
            routable_user_prefix: routable,
        }])
    }

    /// Register a new chain and schedule its first step.
    fn start_chain(&mut self) -> ScenarioAction {
        let chain_id = ChainId(self.next_chain_id);
        self.next_chain_id += 1;
        self.chains.insert(chain_id, PublishChain::new(self.message_budget));

        let delay = self.next_delay();
        tracing::debug!(%chain_id, ?delay, "publish chain scheduled");
        ScenarioAction::Schedule { delay, timer: Timer::Publish(chain_id) }
    }

    /// Start a chain and re-arm the periodic timer.
    ///
    /// NOTE: every re-arm starts another full chain from counter 1, so
    /// periodic mode publishes overlapping counter sequences without bound.
    fn arm_periodic(&mut self) -> Vec<ScenarioAction> {
        let start = self.start_chain();
        let delay = self.next_delay();
        tracing::debug!(?delay, active_chains = self.chains.len(), "periodic publisher re-armed");
        vec![start, ScenarioAction::Schedule { delay, timer: Timer::PeriodicRearm }]
    }

    fn handle_publish_step(
        &mut self,
        chain_id: ChainId,
    ) -> Result<Vec<ScenarioAction>, DriverError> {
        if !self.is_initialized() {
            return Err(DriverError::SessionNotOpen);
        }

        let step = self.chains.get_mut(&chain_id).ok_or(DriverError::UnknownChain(chain_id))?.step();
        let counter = step.counter();

        tracing::info!(%chain_id, counter, "Publishing data with id: {counter}");
        self.stats.published += 1;

        let mut actions = vec![ScenarioAction::Publish {
            payload: Bytes::from(counter.to_string()),
            freshness: self.config.freshness,
        }];

        match step {
            ChainStep::Continue { .. } => {
                let delay = self.next_delay();
                actions.push(ScenarioAction::Schedule { delay, timer: Timer::Publish(chain_id) });
            },
            ChainStep::Finished { .. } => {
                self.chains.remove(&chain_id);
                tracing::debug!(%chain_id, budget = self.message_budget, "publish chain finished");
            },
        }

        Ok(actions)
    }

    fn handle_sync_update(&mut self, updates: Vec<MissingDataInfo>) -> Vec<ScenarioAction> {
        tracing::info!(ranges = updates.len(), "Process sync update");
        self.stats.updates += 1;

        let mut actions = Vec::new();
        for info in updates {
            tracing::debug!(session = %info.session, low = info.low, high = info.high, "missing data");
            for request in self.fetches.submit_range(info) {
                actions.push(self.fetch_action(request));
            }
        }

        if self.fetches.backlog_len() > 0 {
            tracing::debug!(
                outstanding = self.fetches.outstanding(),
                deferred_ranges = self.fetches.backlog_len(),
                "fetch limit reached"
            );
        }

        actions
    }

    fn fetch_action(&mut self, request: FetchRequest) -> ScenarioAction {
        self.stats.fetches_issued += 1;
        ScenarioAction::Fetch {
            session: request.session,
            seq: request.seq,
            retries: self.config.fetch_retries,
        }
    }

    /// Free a fetch slot and issue whatever was waiting for it.
    fn release_fetch_slot(&mut self) -> Vec<ScenarioAction> {
        match self.fetches.complete() {
            Some(request) => vec![self.fetch_action(request)],
            None => Vec::new(),
        }
    }

    fn handle_data(&mut self, data: Data) -> Vec<ScenarioAction> {
        let mut actions = self.release_fetch_slot();

        let Some(peer) = data.peer_identity().map(ToString::to_string) else {
            tracing::warn!(name = %data.name, "fetched data has no peer component, dropping");
            return actions;
        };
        let content = String::from_utf8_lossy(&data.content).into_owned();

        tracing::info!("Data received from {peer} : {content}");
        self.stats.delivered += 1;

        actions.push(ScenarioAction::Deliver(ReceivedData { peer, content, name: data.name }));
        actions
    }

    fn handle_fetch_failed(&mut self, session: &Name, seq: SeqNo) -> Vec<ScenarioAction> {
        tracing::warn!(%session, seq, retries = self.config.fetch_retries, "fetch failed");
        self.stats.fetch_failures += 1;
        self.release_fetch_slot()
    }
}
