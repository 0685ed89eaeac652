//! Scenario driver tests

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chronosim_driver::{
    ChainId, Data, DriverConfig, DriverError, MissingDataInfo, Name, ScenarioAction,
    ScenarioDriver, ScenarioEvent, Timer,
};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

// Test environment using a seeded ChaCha RNG
#[derive(Clone)]
struct TestEnv(Arc<Mutex<ChaCha8Rng>>);

impl TestEnv {
    fn new(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))))
    }
}

impl chronosim_driver::Environment for TestEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.0.lock().expect("rng poisoned").fill_bytes(buffer);
    }
}

fn name(uri: &str) -> Name {
    Name::from_uri(uri).expect("valid uri")
}

/// Driver with the usual scenario prefixes, not yet initialized.
fn driver(seed: u64, config: DriverConfig) -> ScenarioDriver<TestEnv> {
    let mut driver = ScenarioDriver::new(TestEnv::new(seed), config).expect("valid config");
    driver.set_sync_prefix(name("/ndn/broadcast/sync")).expect("configurable");
    driver.set_user_prefix(name("/peer0")).expect("configurable");
    driver.set_routing_prefix(name("/ndn")).expect("configurable");
    driver
}

fn initialized(seed: u64, config: DriverConfig) -> ScenarioDriver<TestEnv> {
    let mut driver = driver(seed, config);
    driver.handle(ScenarioEvent::Initialize).expect("initialize");
    driver
}

fn scheduled(actions: &[ScenarioAction]) -> Vec<(Duration, Timer)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ScenarioAction::Schedule { delay, timer } => Some((*delay, *timer)),
            _ => None,
        })
        .collect()
}

fn published(actions: &[ScenarioAction]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match a {
            ScenarioAction::Publish { payload, .. } => {
                Some(String::from_utf8(payload.to_vec()).expect("utf8 payload"))
            },
            _ => None,
        })
        .collect()
}

fn fetches(actions: &[ScenarioAction]) -> Vec<(Name, u64, u32)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ScenarioAction::Fetch { session, seq, retries } => {
                Some((session.clone(), *seq, *retries))
            },
            _ => None,
        })
        .collect()
}

/// Follow one chain's timers until it stops rescheduling.
///
/// Returns the published payloads and the delays between them.
fn run_chain(driver: &mut ScenarioDriver<TestEnv>) -> (Vec<String>, Vec<Duration>) {
    let start = driver.handle(ScenarioEvent::Start).expect("start");
    let mut pending = scheduled(&start);
    let mut payloads = Vec::new();
    let mut delays = Vec::new();

    while let Some((delay, timer)) = pending.pop() {
        delays.push(delay);
        let actions = driver.handle(ScenarioEvent::TimerFired(timer)).expect("publish step");
        payloads.extend(published(&actions));
        pending.extend(scheduled(&actions));
        assert!(pending.len() <= 1, "a single chain never has two timers pending");
    }

    (payloads, delays)
}

#[test]
fn initialize_opens_session_with_routable_prefix() {
    let mut driver = driver(1, DriverConfig::default());
    let actions = driver.handle(ScenarioEvent::Initialize).expect("initialize");

    assert_eq!(actions, vec![ScenarioAction::OpenSession {
        sync_prefix: name("/ndn/broadcast/sync"),
        routable_user_prefix: name("/ndn/peer0"),
    }]);
    assert_eq!(driver.routable_user_prefix(), Some(&name("/ndn/peer0")));
}

#[test]
fn prefixes_frozen_after_initialize() {
    let mut driver = initialized(1, DriverConfig::default());

    assert_eq!(driver.set_user_prefix(name("/other")), Err(DriverError::AlreadyInitialized));
    assert_eq!(driver.set_sync_prefix(name("/other")), Err(DriverError::AlreadyInitialized));
    assert_eq!(driver.set_routing_prefix(name("/other")), Err(DriverError::AlreadyInitialized));
    assert_eq!(driver.handle(ScenarioEvent::Initialize), Err(DriverError::AlreadyInitialized));
    assert_eq!(driver.user_prefix(), &name("/peer0"));
}

#[test]
fn invalid_config_rejected_at_construction() {
    let result = ScenarioDriver::new(TestEnv::new(1), DriverConfig::with_messages(4, 2));
    assert!(matches!(result, Err(DriverError::Config(_))));
}

#[test]
fn start_schedules_one_publish_in_delay_range() {
    let mut driver = initialized(2, DriverConfig::default());
    let actions = driver.handle(ScenarioEvent::Start).expect("start");

    let timers = scheduled(&actions);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].1, Timer::Publish(ChainId(0)));
    assert!((1000..=3000).contains(&timers[0].0.as_millis()));
    assert!(published(&actions).is_empty(), "start publishes nothing by itself");
}

#[test]
fn chain_publishes_exactly_budget_messages_in_order() {
    let mut driver = initialized(3, DriverConfig::with_messages(5, 12));
    let budget = driver.message_budget();

    let (payloads, delays) = run_chain(&mut driver);

    let expected: Vec<String> = (1..=budget).map(|n| n.to_string()).collect();
    assert_eq!(payloads, expected);
    assert_eq!(delays.len() as u64, budget);
    for delay in delays {
        assert!((1000..=3000).contains(&delay.as_millis()), "delay out of range: {delay:?}");
    }
    assert_eq!(driver.active_chains(), 0);
    assert_eq!(driver.stats().published, budget);
}

#[test]
fn finished_chain_timer_is_rejected() {
    let mut driver = initialized(4, DriverConfig::with_messages(1, 1));
    let (payloads, _) = run_chain(&mut driver);
    assert_eq!(payloads, vec!["1"]);

    let late = driver.handle(ScenarioEvent::TimerFired(Timer::Publish(ChainId(0))));
    assert_eq!(late, Err(DriverError::UnknownChain(ChainId(0))));
}

#[test]
fn zero_budget_publishes_once() {
    let mut driver = initialized(15, DriverConfig::with_messages(0, 0));
    assert_eq!(driver.message_budget(), 0);

    let (payloads, delays) = run_chain(&mut driver);
    assert_eq!(payloads, vec!["1"]);
    assert_eq!(delays.len(), 1);
    assert_eq!(driver.active_chains(), 0);
}

#[test]
fn publish_uses_fixed_freshness() {
    let mut driver = initialized(5, DriverConfig::default());
    driver.handle(ScenarioEvent::Start).expect("start");
    let actions =
        driver.handle(ScenarioEvent::TimerFired(Timer::Publish(ChainId(0)))).expect("step");

    assert!(actions.iter().any(|a| matches!(
        a,
        ScenarioAction::Publish { freshness, .. } if *freshness == Duration::from_millis(4000)
    )));
}

#[test]
fn publish_before_initialize_fails() {
    let mut driver = driver(6, DriverConfig::default());
    driver.handle(ScenarioEvent::Start).expect("start only schedules");

    let result = driver.handle(ScenarioEvent::TimerFired(Timer::Publish(ChainId(0))));
    assert_eq!(result, Err(DriverError::SessionNotOpen));
}

#[test]
fn start_periodic_arms_chain_and_rearm() {
    let mut driver = initialized(7, DriverConfig::default());
    let actions = driver.handle(ScenarioEvent::StartPeriodic).expect("start periodic");

    let timers: Vec<Timer> = scheduled(&actions).into_iter().map(|(_, t)| t).collect();
    assert_eq!(timers, vec![Timer::Publish(ChainId(0)), Timer::PeriodicRearm]);

    // Each re-arm starts a fresh chain and arms itself again.
    for round in 1..=3 {
        let actions =
            driver.handle(ScenarioEvent::TimerFired(Timer::PeriodicRearm)).expect("rearm");
        let timers: Vec<Timer> = scheduled(&actions).into_iter().map(|(_, t)| t).collect();
        assert_eq!(timers, vec![Timer::Publish(ChainId(round)), Timer::PeriodicRearm]);
    }
    assert_eq!(driver.active_chains(), 4);
}

#[test]
fn periodic_chains_each_count_from_one() {
    let mut driver = initialized(8, DriverConfig::with_messages(3, 3));
    driver.handle(ScenarioEvent::StartPeriodic).expect("start periodic");
    driver.handle(ScenarioEvent::TimerFired(Timer::PeriodicRearm)).expect("rearm");

    let first =
        driver.handle(ScenarioEvent::TimerFired(Timer::Publish(ChainId(0)))).expect("step");
    let second =
        driver.handle(ScenarioEvent::TimerFired(Timer::Publish(ChainId(1)))).expect("step");

    assert_eq!(published(&first), vec!["1"]);
    assert_eq!(published(&second), vec!["1"]);
}

#[test]
fn update_range_fetches_each_sequence_number() {
    let mut driver = initialized(9, DriverConfig::default());
    let session_a = name("/ndn/peer1").append_number(1000);

    let actions = driver
        .handle(ScenarioEvent::SyncUpdate(vec![MissingDataInfo::new(session_a.clone(), 1, 3)]))
        .expect("update");

    assert_eq!(fetches(&actions), vec![
        (session_a.clone(), 1, 2),
        (session_a.clone(), 2, 2),
        (session_a, 3, 2),
    ]);
    assert_eq!(driver.stats().fetches_issued, 3);
}

#[test]
fn empty_update_issues_no_fetches() {
    let mut driver = initialized(10, DriverConfig::default());
    let actions = driver.handle(ScenarioEvent::SyncUpdate(Vec::new())).expect("update");

    assert!(actions.is_empty());
    assert_eq!(driver.stats().updates, 1);
}

#[test]
fn multiple_ranges_are_not_deduplicated() {
    let mut driver = initialized(11, DriverConfig::default());
    let session = name("/ndn/peer1").append_number(1);

    let actions = driver
        .handle(ScenarioEvent::SyncUpdate(vec![
            MissingDataInfo::new(session.clone(), 2, 3),
            MissingDataInfo::new(session, 3, 3),
        ]))
        .expect("update");

    let seqs: Vec<u64> = fetches(&actions).into_iter().map(|(_, seq, _)| seq).collect();
    assert_eq!(seqs, vec![2, 3, 3]);
}

#[test]
fn fetched_data_is_delivered_with_peer_identity() {
    let mut driver = initialized(12, DriverConfig::default());
    let data_name = name("/ndn/peer2").append_number(77).append_number(4);
    let data = Data::new(data_name.clone(), "4", Duration::from_millis(4000));

    let actions = driver.handle(ScenarioEvent::DataFetched(data)).expect("data");

    match actions.as_slice() {
        [ScenarioAction::Deliver(received)] => {
            assert_eq!(received.peer, "peer2");
            assert_eq!(received.content, "4");
            assert_eq!(received.name, data_name);
        },
        other => panic!("expected a single delivery, got {other:?}"),
    }
    assert_eq!(driver.stats().delivered, 1);
}

#[test]
fn data_without_peer_component_is_dropped() {
    let mut driver = initialized(13, DriverConfig::default());
    let data = Data::new(name("/ndn"), "x", Duration::ZERO);

    let actions = driver.handle(ScenarioEvent::DataFetched(data)).expect("data");
    assert!(actions.is_empty());
    assert_eq!(driver.stats().delivered, 0);
}

#[test]
fn fetch_limit_releases_backlog_on_completion() {
    let config = DriverConfig { max_outstanding_fetches: Some(2), ..DriverConfig::default() };
    let mut driver = initialized(14, config);
    let session = name("/ndn/peer1").append_number(5);

    let actions = driver
        .handle(ScenarioEvent::SyncUpdate(vec![MissingDataInfo::new(session.clone(), 1, 5)]))
        .expect("update");
    assert_eq!(fetches(&actions).len(), 2);
    assert_eq!(driver.outstanding_fetches(), 2);

    let data = Data::new(session.clone().append_number(1), "1", Duration::ZERO);
    let actions = driver.handle(ScenarioEvent::DataFetched(data)).expect("data");
    assert_eq!(fetches(&actions), vec![(session.clone(), 3, 2)]);

    let actions = driver
        .handle(ScenarioEvent::FetchFailed { session: session.clone(), seq: 2 })
        .expect("failure");
    assert_eq!(fetches(&actions), vec![(session, 4, 2)]);
    assert_eq!(driver.stats().fetch_failures, 1);
    assert_eq!(driver.outstanding_fetches(), 2);
}

#[test]
fn wide_range_under_fetch_limit_is_issued_lazily() {
    let config = DriverConfig { max_outstanding_fetches: Some(1), ..DriverConfig::default() };
    let mut driver = initialized(16, config);
    let wide = name("/ndn/peer1").append_number(1);
    let narrow = name("/ndn/peer2").append_number(1);

    let actions = driver
        .handle(ScenarioEvent::SyncUpdate(vec![
            MissingDataInfo::new(wide.clone(), 1, u64::MAX),
            MissingDataInfo::new(narrow, 7, 9),
        ]))
        .expect("update");
    assert_eq!(fetches(&actions), vec![(wide.clone(), 1, 2)]);
    assert_eq!(driver.outstanding_fetches(), 1);
    assert_eq!(driver.deferred_ranges(), 2);

    for seq in 2..=4 {
        let actions = driver
            .handle(ScenarioEvent::FetchFailed { session: wide.clone(), seq: seq - 1 })
            .expect("failure");
        assert_eq!(fetches(&actions), vec![(wide.clone(), seq, 2)]);
        assert_eq!(driver.deferred_ranges(), 2);
    }
}

#[test]
fn same_seed_same_schedule() {
    let run = |seed| {
        let mut driver = initialized(seed, DriverConfig::with_messages(3, 20));
        let (payloads, delays) = run_chain(&mut driver);
        (driver.message_budget(), payloads, delays)
    };

    assert_eq!(run(42), run(42));
}

proptest! {
    #[test]
    fn prop_budget_within_range(seed in any::<u64>(), min in 0u64..50, extra in 0u64..50) {
        let max = min + extra;
        let driver = ScenarioDriver::new(TestEnv::new(seed), DriverConfig::with_messages(min, max))
            .expect("valid config");

        prop_assert!((min..=max).contains(&driver.message_budget()));
    }

    #[test]
    fn prop_chain_never_exceeds_budget(seed in any::<u64>(), min in 1u64..8, extra in 0u64..8) {
        let mut driver = initialized(seed, DriverConfig::with_messages(min, min + extra));
        let budget = driver.message_budget();

        let (payloads, _) = run_chain(&mut driver);
        let counters: Vec<u64> = payloads.iter().map(|p| p.parse().expect("decimal")).collect();

        prop_assert_eq!(counters.len() as u64, budget);
        prop_assert!(counters.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(counters.last().copied(), Some(budget));
    }

    #[test]
    fn prop_range_width_equals_fetch_count(low in 1u64..100, width in 0u64..64) {
        let mut driver = initialized(0, DriverConfig::default());
        let session = name("/ndn/peer9").append_number(1);
        let high = low + width;

        let actions = driver
            .handle(ScenarioEvent::SyncUpdate(vec![MissingDataInfo::new(session, low, high)]))
            .expect("update");

        let seqs: Vec<u64> = fetches(&actions).into_iter().map(|(_, seq, _)| seq).collect();
        prop_assert_eq!(seqs, (low..=high).collect::<Vec<_>>());
    }
}
