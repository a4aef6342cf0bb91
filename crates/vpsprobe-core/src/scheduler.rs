//! Fixed-interval loop driving the reporter.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::MetricsSource;
use crate::reporter::Reporter;
use crate::transport::Transport;

/// Counters for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Runs one cycle immediately, then one per `period`, until `cancel` fires.
///
/// A cycle always finishes (or fails) before the next tick is awaited; a
/// slow cycle delays the schedule instead of bursting. Failures are logged
/// and never end the loop.
pub async fn run<S, T>(
    reporter: &Reporter<S, T>,
    period: Duration,
    cancel: &CancellationToken,
) -> LoopStats
where
    S: MetricsSource,
    T: Transport,
{
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = LoopStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let t0 = Instant::now();
        let result = reporter.run_cycle(cancel).await;
        let elapsed = t0.elapsed();
        stats.cycles += 1;

        match result {
            Ok(report) => {
                stats.succeeded += 1;
                if stats.succeeded == 1 {
                    info!(
                        status = report.status,
                        total_rx = report.bandwidth.total_rx_bytes,
                        total_tx = report.bandwidth.total_tx_bytes,
                        duration_ms = elapsed.as_millis() as u64,
                        "first report delivered"
                    );
                } else {
                    debug!(
                        cycle = stats.cycles,
                        rx_speed = report.bandwidth.rx_speed,
                        tx_speed = report.bandwidth.tx_speed,
                        duration_ms = elapsed.as_millis() as u64,
                        "cycle completed"
                    );
                }
                if !report.persisted {
                    warn!(cycle = stats.cycles, "cycle delivered but state not persisted");
                }
            }
            Err(e) => {
                stats.failed += 1;
                warn!(
                    error = %e,
                    rolled_back = e.rolled_back(),
                    cycle = stats.cycles,
                    duration_ms = elapsed.as_millis() as u64,
                    "cycle failed"
                );
            }
        }

        if elapsed > period {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = period.as_millis() as u64,
                "cycle exceeded interval"
            );
        }
    }

    info!(
        cycles = stats.cycles,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "report loop stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectError;
    use crate::reporter::tests::{ScriptedSource, ScriptedTransport, config, host};
    use crate::state::CounterStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_precancelled_loop_runs_nothing() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::new(
            &config(dir.path().join("state.json")),
            ScriptedSource::new(vec![Ok(host(1, 1, 1))]),
            ScriptedTransport::default(),
            CounterStore::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = run(&reporter, Duration::from_millis(10), &cancel).await;
        assert_eq!(stats, LoopStats::default());
    }

    #[tokio::test]
    async fn test_first_cycle_is_immediate_and_cancel_stops_loop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let reporter = Reporter::new(
            &config(path.clone()),
            ScriptedSource::new(vec![Ok(host(1, 500, 700))]),
            ScriptedTransport::default(),
            CounterStore::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        // The period is far longer than the test, so only the immediate
        // first tick can have fired.
        let stats = run(&reporter, Duration::from_secs(3600), &cancel).await;
        assert_eq!(
            stats,
            LoopStats {
                cycles: 1,
                succeeded: 1,
                failed: 0
            }
        );
        assert_eq!(CounterStore::load(&path).state().last_tx_bytes, 700);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_loop() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::new(
            &config(dir.path().join("state.json")),
            ScriptedSource::new(vec![
                Err(CollectError::Parse("no cpu line".into())),
                Ok(host(1, 100, 100)),
                Ok(host(1, 300, 100)),
            ]),
            ScriptedTransport::default(),
            CounterStore::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let stats = run(&reporter, Duration::from_millis(20), &cancel).await;
        assert!(stats.cycles >= 3, "{:?}", stats);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, stats.cycles - 2);
        assert_eq!(reporter.store().state().total_rx_bytes, 200);
    }
}
