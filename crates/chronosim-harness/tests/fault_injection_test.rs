//! Scenarios under datagram loss.
//!
//! Lost updates are never recovered (there is no digest exchange), and lost
//! interests or data cost a retry. With retries exhausted the fetch is
//! reported as failed, so every fetch ends in exactly one of delivery,
//! failure, or still pending at the end of the run.

use std::time::Duration;

use chronosim_harness::{Scenario, ScenarioReport};

fn lossy(seed: u64, fail_rate: f64) -> ScenarioReport {
    Scenario::new()
        .with_nodes(3)
        .with_seed(seed)
        .with_messages(5, 5)
        .with_fail_rate(fail_rate)
        .with_duration(Duration::from_secs(40))
        .run()
        .expect("scenario runs")
}

#[test]
fn outcomes_never_exceed_fetches() {
    let report = lossy(12345, 0.05);

    for node in &report.nodes {
        let stats = node.stats;
        assert!(
            stats.delivered + stats.fetch_failures <= stats.fetches_issued,
            "{}: {stats:?}",
            node.host
        );
        assert_eq!(stats.delivered, node.received.len() as u64);
        assert!(node.interests_sent >= stats.fetches_issued);
    }
}

#[test]
fn publishing_is_unaffected_by_loss() {
    let report = lossy(777, 0.2);

    for node in &report.nodes {
        let payloads: Vec<_> = node.published.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, ["1", "2", "3", "4", "5"]);
    }
}

#[test]
fn heavy_loss_loses_deliveries() {
    let clean = lossy(31, 0.0);
    let degraded = lossy(31, 0.5);

    assert_eq!(clean.total_received(), 30);
    assert!(degraded.total_received() < clean.total_received());
}

#[test]
fn loss_pattern_is_deterministic() {
    assert_eq!(lossy(4242, 0.1), lossy(4242, 0.1));
}
