//! Events consumed and actions produced by the driver.

use std::time::Duration;

use bytes::Bytes;
use chronosim_core::{Data, MissingDataInfo, Name, SeqNo};

use crate::chain::ChainId;

/// Timers the driver asks its runtime to arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Next step of a publish chain.
    Publish(ChainId),
    /// Periodic re-arm: starts a fresh publish chain and re-arms itself.
    PeriodicRearm,
}

/// Events fed into the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioEvent {
    /// Freeze the prefixes and open the sync session.
    Initialize,
    /// Start one publish chain.
    Start,
    /// Start one publish chain plus the infinite re-arm chain.
    StartPeriodic,
    /// A timer previously requested with [`ScenarioAction::Schedule`] fired.
    TimerFired(Timer),
    /// The sync session announced new remote data.
    SyncUpdate(Vec<MissingDataInfo>),
    /// A fetch completed.
    DataFetched(Data),
    /// A fetch exhausted its retry budget.
    FetchFailed {
        /// Session the fetch targeted.
        session: Name,
        /// Sequence number that could not be fetched.
        seq: SeqNo,
    },
}

/// Data handed to the print handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedData {
    /// Publisher identity (name component 1), in URI form.
    pub peer: String,
    /// Payload decoded as text.
    pub content: String,
    /// Full data name.
    pub name: Name,
}

/// Actions produced by the driver for its runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioAction {
    /// Create the sync session and route its updates back to this driver.
    OpenSession {
        /// Sync group prefix.
        sync_prefix: Name,
        /// Routing prefix followed by user prefix.
        routable_user_prefix: Name,
    },

    /// Fire `timer` once after `delay`.
    Schedule {
        /// Delay from now.
        delay: Duration,
        /// Timer to deliver back as [`ScenarioEvent::TimerFired`].
        timer: Timer,
    },

    /// Publish one data packet on the session.
    Publish {
        /// Payload bytes.
        payload: Bytes,
        /// Freshness of the packet.
        freshness: Duration,
    },

    /// Fetch one sequence number from a remote session.
    Fetch {
        /// Remote session name.
        session: Name,
        /// Sequence number to fetch.
        seq: SeqNo,
        /// Retries after the first attempt.
        retries: u32,
    },

    /// Fetched data ready for display.
    Deliver(ReceivedData),
}
