//! Multi-node scenarios under turmoil.
//!
//! A [`Scenario`] builds one [`SimNode`] per host, runs them together in a
//! turmoil simulation, and returns what every node published and received.
//! An optional oracle checks the report before it is returned.
//!
//! # Determinism
//!
//! The turmoil RNG (packet loss) and every node's `SimEnv` are derived from
//! the scenario seed, so the same configuration always yields the same
//! report.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chronosim_core::Name;
use chronosim_driver::{ConfigError, DriverConfig, DriverError, ScenarioDriver, UniformRange};
use thiserror::Error;
use tracing::Instrument;

use crate::{
    node::{NodeConfig, NodeReport, SimNode},
    sim_env::SimEnv,
};

/// Extra simulated time turmoil allows past the scenario duration.
const SIMULATION_SLACK: Duration = Duration::from_secs(5);

/// Checks a finished scenario. Returns a description of the violation.
pub type Oracle = Box<dyn Fn(&ScenarioReport) -> Result<(), String>>;

/// Errors from building or running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Scenario parameters are out of range.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// A driver could not be built or configured.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The simulation itself failed (a node errored or ran out of time).
    #[error("simulation failed: {0}")]
    Simulation(String),

    /// The oracle rejected the outcome.
    #[error("oracle violation: {0}")]
    Oracle(String),
}

impl From<ConfigError> for ScenarioError {
    fn from(err: ConfigError) -> Self {
        Self::Driver(DriverError::Config(err))
    }
}

/// Scenario parameters.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Number of hosts, named `peer0`, `peer1`, ...
    pub nodes: usize,
    /// Seed for turmoil and every node's environment.
    pub seed: u64,
    /// Sync group prefix shared by every node.
    pub sync_prefix: Name,
    /// Routing prefix placed before each node's user prefix.
    pub routing_prefix: Name,
    /// Driver settings applied to every node.
    pub driver: DriverConfig,
    /// Start every node with `StartPeriodic` instead of `Start`.
    pub periodic: bool,
    /// Virtual time each node runs for.
    pub duration: Duration,
    /// Probability that turmoil drops a datagram.
    pub fail_rate: f64,
    /// One-way link latency.
    pub latency: Duration,
    /// Time a node waits for a `Data` reply before retrying.
    pub interest_lifetime: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            seed: 0,
            sync_prefix: Name::new().append("ndn").append("broadcast").append("sync"),
            routing_prefix: Name::new().append("ndn"),
            driver: DriverConfig::default(),
            periodic: false,
            duration: Duration::from_secs(60),
            fail_rate: 0.0,
            latency: Duration::from_millis(10),
            interest_lifetime: Duration::from_millis(1000),
        }
    }
}

impl ScenarioConfig {
    /// Check the scenario-level parameters and the driver config.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.nodes == 0 {
            return Err(ScenarioError::InvalidScenario("at least one node is required".into()));
        }
        if !(0.0..=1.0).contains(&self.fail_rate) {
            return Err(ScenarioError::InvalidScenario(format!(
                "fail rate {} is outside [0, 1]",
                self.fail_rate
            )));
        }
        if self.interest_lifetime.is_zero() {
            return Err(ScenarioError::InvalidScenario("interest lifetime must be non-zero".into()));
        }
        self.driver.validate()?;
        Ok(())
    }
}

/// Host name of node `index`.
pub fn host_name(index: usize) -> String {
    format!("peer{index}")
}

/// Seed for node `index`, derived from the scenario seed.
pub fn node_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Result of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Seed the run used.
    pub seed: u64,
    /// Per-node reports, ordered by host index.
    pub nodes: Vec<NodeReport>,
}

impl ScenarioReport {
    /// Report for `host`.
    pub fn node(&self, host: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.host == host)
    }

    /// Total publications across all nodes.
    pub fn total_published(&self) -> usize {
        self.nodes.iter().map(|n| n.published.len()).sum()
    }

    /// Total deliveries across all nodes.
    pub fn total_received(&self) -> usize {
        self.nodes.iter().map(|n| n.received.len()).sum()
    }

    /// Total fetch failures across all nodes.
    pub fn total_fetch_failures(&self) -> u64 {
        self.nodes.iter().map(|n| n.stats.fetch_failures).sum()
    }
}

/// Builder and runner for a multi-node scenario.
pub struct Scenario {
    config: ScenarioConfig,
    oracle: Option<Oracle>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Scenario with default parameters.
    pub fn new() -> Self {
        Self { config: ScenarioConfig::default(), oracle: None }
    }

    /// Scenario with explicit parameters.
    pub fn with_config(config: ScenarioConfig) -> Self {
        Self { config, oracle: None }
    }

    /// Number of nodes.
    #[must_use]
    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.config.nodes = nodes;
        self
    }

    /// Scenario seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Message budget range for every node.
    #[must_use]
    pub fn with_messages(mut self, min: u64, max: u64) -> Self {
        self.config.driver.messages = UniformRange::new(min, max);
        self
    }

    /// Use `StartPeriodic`.
    #[must_use]
    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.config.periodic = periodic;
        self
    }

    /// Virtual run time.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    /// Datagram loss probability.
    #[must_use]
    pub fn with_fail_rate(mut self, fail_rate: f64) -> Self {
        self.config.fail_rate = fail_rate;
        self
    }

    /// One-way link latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Cap on outstanding fetches per node.
    #[must_use]
    pub fn with_fetch_limit(mut self, limit: Option<usize>) -> Self {
        self.config.driver.max_outstanding_fetches = limit;
        self
    }

    /// Check the report before `run` returns it.
    #[must_use]
    pub fn oracle(mut self, oracle: Oracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Parameters this scenario will run with.
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Run the scenario to completion.
    pub fn run(self) -> Result<ScenarioReport, ScenarioError> {
        let config = self.config;
        config.validate()?;

        tracing::info!(
            seed = config.seed,
            nodes = config.nodes,
            periodic = config.periodic,
            duration = ?config.duration,
            "starting scenario"
        );

        let mut sim = turmoil::Builder::new()
            .simulation_duration(config.duration + SIMULATION_SLACK)
            .rng_seed(config.seed)
            .fail_rate(config.fail_rate)
            .min_message_latency(config.latency)
            .max_message_latency(config.latency)
            .build();

        let hosts: Vec<String> = (0..config.nodes).map(host_name).collect();
        let reports: Arc<Mutex<Vec<NodeReport>>> = Arc::new(Mutex::new(Vec::new()));

        for (index, host) in hosts.iter().enumerate() {
            let mut driver =
                ScenarioDriver::new(SimEnv::with_seed(node_seed(config.seed, index)), config.driver.clone())?;
            driver.set_sync_prefix(config.sync_prefix.clone())?;
            driver.set_user_prefix(Name::new().append(host.as_str()))?;
            driver.set_routing_prefix(config.routing_prefix.clone())?;

            let node_config = NodeConfig {
                host: host.clone(),
                peers: hosts.iter().filter(|peer| *peer != host).cloned().collect(),
                interest_lifetime: config.interest_lifetime,
                run_for: config.duration,
                periodic: config.periodic,
            };

            let span = tracing::info_span!("node", host = %host);
            sim.client(
                host.as_str(),
                run_node(node_config, driver, Arc::clone(&reports)).instrument(span),
            );
        }

        sim.run().map_err(|e| ScenarioError::Simulation(e.to_string()))?;

        let mut nodes = std::mem::take(&mut *reports.lock().unwrap_or_else(PoisonError::into_inner));
        if let Some(missing) = hosts.iter().find(|host| !nodes.iter().any(|n| &n.host == *host)) {
            return Err(ScenarioError::Simulation(format!("{missing} did not report")));
        }
        nodes.sort_by_key(|n| hosts.iter().position(|h| *h == n.host));

        let report = ScenarioReport { seed: config.seed, nodes };
        tracing::info!(
            published = report.total_published(),
            received = report.total_received(),
            fetch_failures = report.total_fetch_failures(),
            "scenario finished"
        );

        if let Some(oracle) = &self.oracle {
            oracle(&report).map_err(ScenarioError::Oracle)?;
        }

        Ok(report)
    }
}

/// Body of one turmoil client.
async fn run_node(
    config: NodeConfig,
    driver: ScenarioDriver<SimEnv>,
    reports: Arc<Mutex<Vec<NodeReport>>>,
) -> turmoil::Result {
    let node = SimNode::bind(config, driver).await?;
    let report = node.run().await?;
    reports.lock().unwrap_or_else(PoisonError::into_inner).push(report);
    Ok(())
}
