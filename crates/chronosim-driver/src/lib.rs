//! Scenario Driver
//!
//! Action-based driver that exercises a ChronoSync session inside a simulated
//! network: it publishes an incrementing counter at random intervals and
//! fetches whatever remote peers announce.
//!
//! # Architecture
//!
//! The driver is a pure state machine that:
//! - Receives events from its runtime (start requests, fired timers, sync
//!   updates, fetch completions)
//! - Produces actions for the runtime to execute (open the session, schedule a
//!   timer, publish, fetch, deliver received data)
//! - Uses the `Environment` trait for randomness, so a seeded environment
//!   replays the same scenario exactly
//!
//! # Components
//!
//! - [`ScenarioDriver`]: the state machine
//! - [`PublishChain`]: one self-rescheduling publish chain
//! - [`FetchQueue`]: optional cap on outstanding fetches
//! - [`ScenarioEvent`]: events fed into the driver
//! - [`ScenarioAction`]: actions produced by the driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chain;
mod config;
mod driver;
mod error;
mod event;
mod fetch;

pub use chain::{ChainId, ChainStep, PublishChain};
pub use chronosim_core::{Data, Environment, MissingDataInfo, Name, SeqNo};
pub use config::{
    DEFAULT_FETCH_RETRIES, DEFAULT_FRESHNESS, DriverConfig, MAX_DELAY_MS, MIN_DELAY_MS,
    UniformRange,
};
pub use driver::{DriverStats, ScenarioDriver};
pub use error::{ConfigError, DriverError};
pub use event::{ReceivedData, ScenarioAction, ScenarioEvent, Timer};
pub use fetch::{FetchQueue, FetchRequest};
