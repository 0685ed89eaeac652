//! Simulation harness for the scenario driver.
//!
//! Runs [`ScenarioDriver`](chronosim_driver::ScenarioDriver) instances on
//! turmoil hosts so multi-peer scenarios play out in virtual time, fully
//! determined by one seed.
//!
//! # Components
//!
//! - [`SimEnv`]: seeded `Environment` for each node
//! - [`EventLoop`]: virtual-time timer queue
//! - [`SimNode`]: one host executing its driver's actions over UDP
//! - [`Scenario`]: builds and runs a group of nodes, then checks an oracle
//!
//! # Example
//!
//! ```no_run
//! use chronosim_harness::Scenario;
//!
//! let report = Scenario::new().with_nodes(3).with_seed(42).with_messages(3, 3).run()?;
//! assert_eq!(report.total_published(), 9);
//! # Ok::<(), chronosim_harness::ScenarioError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event_loop;
pub mod node;
pub mod scenario;
pub mod sim_env;
pub mod wire;

pub use event_loop::{EventId, EventLoop};
pub use node::{NodeConfig, NodeError, NodeReport, PublishRecord, ReceiveRecord, SYNC_PORT, SimNode};
pub use scenario::{Oracle, Scenario, ScenarioConfig, ScenarioError, ScenarioReport, host_name, node_seed};
pub use sim_env::SimEnv;
pub use wire::{MAX_DATAGRAM_SIZE, SimMessage, WireError};
