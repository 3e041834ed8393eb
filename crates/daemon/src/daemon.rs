//! Daemon registration and the background worker that runs the consumer.

use std::cell::Cell;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use relaunch_core::RunRetriesSettings;
use relaunch_events::{EventRecord, EventType, Subscription};
use relaunch_infra::DaemonConfig;

use crate::consumer::{EventLogConsumer, IterationSummary};

/// Stable identifier the daemon is registered under.
pub const DAEMON_TYPE: &str = "EVENT_LOG_CONSUMER";

/// The daemon is only needed when run retries are enabled.
pub fn is_daemon_required(settings: &RunRetriesSettings) -> bool {
    settings.enabled
}

/// Daemon types a deployment with `settings` must run.
pub fn required_daemon_types(settings: &RunRetriesSettings) -> Vec<&'static str> {
    if is_daemon_required(settings) {
        vec![DAEMON_TYPE]
    } else {
        Vec::new()
    }
}

/// Daemon runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
    pub iterations: u64,
    pub retries_submitted: u64,
    pub retries_skipped: u64,
    pub retry_failures: u64,
    pub iteration_errors: u64,
    pub last_cursor: Option<u64>,
    pub uptime_secs: u64,
}

impl DaemonStats {
    fn record(&mut self, summary: &IterationSummary) {
        self.iterations += 1;
        self.retries_submitted += summary.submitted;
        self.retries_skipped += summary.skipped + summary.not_submitted;
        self.retry_failures += summary.failed;
        self.last_cursor = summary.cursor;
    }
}

/// Handle to a running daemon.
#[derive(Debug)]
pub struct DaemonHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<DaemonStats>>,
}

impl DaemonHandle {
    /// Run an iteration as soon as possible. Triggers are coalesced.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop after the current run and wait for the worker to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> DaemonStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Automatic run re-execution daemon.
///
/// - Schedule: one consumer iteration every `poll_interval`
/// - Wake-ups: `DaemonHandle::trigger`, or a RUN_FAILURE record on the optional
///   event subscription
/// - Failures: iteration errors are logged and retried with bounded backoff;
///   they never stop the worker
pub struct AutoReexecutionDaemon {
    consumer: EventLogConsumer,
    poll_interval: Duration,
    base_backoff: Duration,
    wakeups: Option<Subscription<EventRecord>>,
}

impl AutoReexecutionDaemon {
    pub fn new(consumer: EventLogConsumer, poll_interval: Duration) -> Self {
        Self {
            consumer,
            poll_interval,
            base_backoff: Duration::from_millis(250),
            wakeups: None,
        }
    }

    /// Build from configuration; the consumer's context must already carry the
    /// configured retry settings.
    pub fn from_config(consumer: EventLogConsumer, config: &DaemonConfig) -> Self {
        Self::new(consumer.with_fetch_limit(config.event_fetch_limit), config.poll_interval)
    }

    pub fn with_wakeups(mut self, subscription: Subscription<EventRecord>) -> Self {
        self.wakeups = Some(subscription);
        self
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Spawn the daemon on its own thread, named after the consumer.
    pub fn spawn(self) -> DaemonHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);
        let stats = Arc::new(Mutex::new(DaemonStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.consumer.name().to_string())
            .spawn(move || daemon_loop(self, shutdown_rx, trigger_rx, stats_clone))
            .expect("failed to spawn auto re-execution daemon thread");

        DaemonHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
            stats,
        }
    }
}

fn daemon_loop(
    daemon: AutoReexecutionDaemon,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<DaemonStats>>,
) {
    let name = daemon.consumer.name().to_string();
    info!(daemon = %name, daemon_type = DAEMON_TYPE, "auto re-execution daemon started");
    let start_time = Instant::now();

    // A dropped handle counts as a shutdown request.
    let stopping = Cell::new(false);
    let should_stop = || {
        if !stopping.get() {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => stopping.set(true),
                Err(TryRecvError::Empty) => {}
            }
        }
        stopping.get()
    };

    let mut next_tick = Instant::now();
    let mut pending = true; // run once on startup
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        if should_stop() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            while next_tick <= now {
                next_tick += daemon.poll_interval;
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }
        if let Some(wakeups) = &daemon.wakeups {
            for record in wakeups.drain() {
                if record.event_type() == EventType::RunFailure {
                    pending = true;
                }
            }
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(50));
            thread::sleep(sleep_for);
            continue;
        }
        pending = false;

        match daemon.consumer.run_iteration(&should_stop) {
            Ok(summary) => {
                failures = 0;
                if summary.submitted > 0 || summary.failed > 0 {
                    info!(
                        daemon = %name,
                        submitted = summary.submitted,
                        failed = summary.failed,
                        cursor = ?summary.cursor,
                        "iteration finished"
                    );
                } else {
                    debug!(daemon = %name, events = summary.events, "iteration finished");
                }
                if let Ok(mut s) = stats.lock() {
                    s.record(&summary);
                }
            }
            Err(e) => {
                failures += 1;
                error!(daemon = %name, error = %e, failures, "daemon iteration failed");
                if let Ok(mut s) = stats.lock() {
                    s.iterations += 1;
                    s.iteration_errors += 1;
                }
                pending = true;
                backoff_until = Some(Instant::now() + backoff(daemon.base_backoff, failures));
            }
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }
    }

    info!(daemon = %name, "auto re-execution daemon stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 30s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(u128::from(pow));
    Duration::from_millis(ms.min(30_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_only_when_retries_are_enabled() {
        assert!(required_daemon_types(&RunRetriesSettings::default()).is_empty());
        assert_eq!(
            required_daemon_types(&RunRetriesSettings::enabled(0)),
            vec![DAEMON_TYPE]
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 3), Duration::from_millis(400));
        assert_eq!(backoff(base, 50), Duration::from_secs(30));
    }
}
