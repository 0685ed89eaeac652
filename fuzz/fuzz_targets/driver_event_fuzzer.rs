//! Fuzz target for the [`ScenarioDriver`] state machine
//!
//! # Strategy
//!
//! - Event sequences: arbitrary mixes of start requests, timer firings for
//!   live and stale chains, sync updates, fetched data and fetch failures
//! - Configs: arbitrary message budgets and fetch limits
//! - Randomness: a fuzz-seeded environment
//!
//! # Invariants
//!
//! - NEVER panic on any event sequence
//! - Nothing publishes before `Initialize`
//! - Each chain publishes `1, 2, ...` and never past the message budget
//!   (a zero budget publishes once)
//! - Every scheduled delay lies inside the configured range
//! - With a fetch limit, outstanding fetches never exceed it
//! - Only fatal errors for events that can never become valid

#![no_main]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use arbitrary::Arbitrary;
use bytes::Bytes;
use chronosim_core::{Data, Environment, MissingDataInfo, Name};
use chronosim_driver::{
    ChainId, DriverConfig, DriverError, ScenarioAction, ScenarioDriver, ScenarioEvent, Timer,
};
use libfuzzer_sys::fuzz_target;

/// Splitmix64 stream seeded from the fuzz input.
#[derive(Clone)]
struct FuzzEnv {
    state: Arc<AtomicU64>,
}

impl Environment for FuzzEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let mut z = self.state.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed);
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            chunk.copy_from_slice(&z.to_le_bytes()[..chunk.len()]);
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Initialize,
    Start,
    StartPeriodic,
    FirePending { pick: u8 },
    FireStale { chain: u8 },
    Update { peer: u8, low: u8, width: u8 },
    Fetched { peer: u8, seq: u8, named: bool },
    Failed { peer: u8, seq: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    min_messages: u8,
    extra_messages: u8,
    fetch_limit: Option<u8>,
    events: Vec<FuzzEvent>,
}

fn session(peer: u8) -> Name {
    Name::new().append("ndn").append(format!("peer{peer}").as_str()).append_number(0)
}

fuzz_target!(|input: FuzzInput| {
    let min = u64::from(input.min_messages % 8);
    let max = min + u64::from(input.extra_messages % 8);
    let limit = input.fetch_limit.map(|l| usize::from(l % 4) + 1);
    let config = DriverConfig {
        max_outstanding_fetches: limit,
        ..DriverConfig::with_messages(min, max)
    };
    let delay_range = config.delay_ms;

    let env = FuzzEnv { state: Arc::new(AtomicU64::new(input.seed)) };
    let mut driver = ScenarioDriver::new(env, config).expect("config is valid");
    let budget = driver.message_budget();
    assert!((min..=max).contains(&budget));

    let mut pending: Vec<Timer> = Vec::new();
    let mut last_counter: HashMap<ChainId, u64> = HashMap::new();

    for event in input.events.into_iter().take(256) {
        let (event, fired) = match event {
            FuzzEvent::Initialize => (ScenarioEvent::Initialize, None),
            FuzzEvent::Start => (ScenarioEvent::Start, None),
            FuzzEvent::StartPeriodic => (ScenarioEvent::StartPeriodic, None),
            FuzzEvent::FirePending { pick } => {
                if pending.is_empty() {
                    continue;
                }
                let timer = pending.remove(usize::from(pick) % pending.len());
                (ScenarioEvent::TimerFired(timer), Some(timer))
            },
            FuzzEvent::FireStale { chain } => {
                let timer = Timer::Publish(ChainId(u64::from(chain)));
                (ScenarioEvent::TimerFired(timer), Some(timer))
            },
            FuzzEvent::Update { peer, low, width } => {
                let low = u64::from(low);
                let high = low + u64::from(width % 16);
                (ScenarioEvent::SyncUpdate(vec![MissingDataInfo::new(session(peer), low, high)]), None)
            },
            FuzzEvent::Fetched { peer, seq, named } => {
                let name = if named {
                    session(peer).append_number(u64::from(seq))
                } else {
                    Name::new().append("x")
                };
                let data = Data::new(name, Bytes::from(seq.to_string()), Duration::from_secs(4));
                (ScenarioEvent::DataFetched(data), None)
            },
            FuzzEvent::Failed { peer, seq } => {
                (ScenarioEvent::FetchFailed { session: session(peer), seq: u64::from(seq) }, None)
            },
        };

        let was_initialized = driver.is_initialized();
        let actions = match driver.handle(event) {
            Ok(actions) => actions,
            Err(DriverError::AlreadyInitialized) => {
                assert!(was_initialized);
                continue;
            },
            Err(DriverError::SessionNotOpen) => {
                assert!(!was_initialized);
                // The timer stays armed; the runtime would surface the error.
                if let Some(timer) = fired {
                    pending.push(timer);
                }
                continue;
            },
            Err(DriverError::UnknownChain(_)) => continue,
            Err(e) => panic!("unexpected driver error: {e}"),
        };

        let mut published_here = Vec::new();
        for action in actions {
            match action {
                ScenarioAction::OpenSession { .. } => assert!(!was_initialized),
                ScenarioAction::Schedule { delay, timer } => {
                    let ms = u64::try_from(delay.as_millis()).expect("delay fits u64");
                    assert!(delay_range.contains(ms), "delay {ms} outside range");
                    pending.push(timer);
                },
                ScenarioAction::Publish { payload, .. } => {
                    assert!(was_initialized, "published before Initialize");
                    let counter: u64 = std::str::from_utf8(&payload)
                        .expect("payload is ascii")
                        .parse()
                        .expect("payload is a counter");
                    // A zero budget still publishes once.
                    assert!(counter >= 1 && counter <= budget.max(1));
                    published_here.push(counter);
                },
                ScenarioAction::Fetch { .. } => {},
                ScenarioAction::Deliver(received) => {
                    assert!(received.peer.starts_with("peer"));
                },
            }
        }

        if let (Some(Timer::Publish(chain_id)), [counter]) = (fired, published_here.as_slice()) {
            let previous = last_counter.insert(chain_id, *counter).unwrap_or(0);
            assert_eq!(*counter, previous + 1, "{chain_id} skipped a counter");
        }

        if let Some(limit) = limit {
            assert!(driver.outstanding_fetches() <= limit);
        }
    }
});
