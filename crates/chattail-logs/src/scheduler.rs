use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::publisher::{PublishOutcome, Publisher};

/// Minimum pause after a polling cycle
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(600);

/// How often an idle loop re-reads the source's tick
pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Enforced after every polling cycle, whatever the tick does
    pub min_interval: Duration,

    /// Pause between tick reads while idle
    pub clock_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            clock_interval: DEFAULT_CLOCK_INTERVAL,
        }
    }
}

/// Where a publisher loop is between two tick reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next external tick
    Idle,

    /// Running one publish cycle for this tick
    Polling { tick: u64 },
}

/// Decides which external ticks a publisher polls on
#[derive(Debug, Clone)]
pub struct TickCadence {
    every: u64,
    last_seen: Option<u64>,
    last_polled: Option<u64>,
}

impl TickCadence {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            last_seen: None,
            last_polled: None,
        }
    }

    /// Record a tick reading and return the state the loop moves to.
    ///
    /// A repeated reading is always idle. A tick lower than the last polled
    /// one means the source restarted its clock and counts as due.
    pub fn observe(&mut self, tick: u64) -> LoopState {
        if self.last_seen == Some(tick) {
            return LoopState::Idle;
        }
        self.last_seen = Some(tick);

        let due = match self.last_polled {
            None => true,
            Some(last) if tick < last => true,
            Some(last) => tick - last >= self.every,
        };

        if due {
            self.last_polled = Some(tick);
            LoopState::Polling { tick }
        } else {
            LoopState::Idle
        }
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    pub fn last_polled(&self) -> Option<u64> {
        self.last_polled
    }
}

/// Totals from a scheduler shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Publishers whose loop stopped and whose subscribers were closed
    pub publishers: usize,

    /// Subscribers whose close failed
    pub failed_closes: usize,

    /// Publisher tasks that panicked or were aborted
    pub panicked: usize,
}

/// Runs each publisher in its own task until cancelled
pub struct Scheduler {
    config: SchedulerConfig,

    /// Cancellation token shared with every publisher loop
    cancel: CancellationToken,

    /// Running loops, keyed by publisher name
    tasks: Vec<(String, JoinHandle<Publisher>)>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Token that stops every loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start polling with this publisher
    pub fn spawn(&mut self, publisher: Publisher) {
        let name = publisher.name().to_string();
        info!(
            publisher = %name,
            every_ticks = publisher.every_ticks(),
            subscribers = publisher.subscriber_count(),
            "starting publisher"
        );

        let task = tokio::spawn(run_publisher(publisher, self.config, self.cancel.clone()));
        self.tasks.push((name, task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every loop, wait for in-flight cycles, then close each
    /// publisher's subscribers once.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.cancel.cancel();

        let (names, tasks): (Vec<_>, Vec<_>) = self.tasks.drain(..).unzip();
        let results = join_all(tasks).await;

        let mut report = ShutdownReport::default();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(mut publisher) => {
                    report.publishers += 1;
                    report.failed_closes += publisher.close();
                }
                Err(e) => {
                    report.panicked += 1;
                    warn!(publisher = %name, error = %e, "publisher task did not finish");
                }
            }
        }

        info!(
            publishers = report.publishers,
            failed_closes = report.failed_closes,
            panicked = report.panicked,
            "scheduler stopped"
        );
        report
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, task) in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.tasks.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("publishers", &names)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// One publisher's loop. Cancellation is only observed between cycles, so a
/// started publish always finishes its notification.
async fn run_publisher(
    mut publisher: Publisher,
    config: SchedulerConfig,
    cancel: CancellationToken,
) -> Publisher {
    let clock = publisher.clock();
    let mut cadence = TickCadence::new(publisher.every_ticks());

    loop {
        let reading = tokio::select! {
            _ = cancel.cancelled() => break,
            reading = clock.tick() => reading,
        };

        let state = match reading {
            Ok(tick) => cadence.observe(tick),
            Err(e) => {
                debug!(publisher = %publisher.name(), error = %e, "tick unavailable");
                LoopState::Idle
            }
        };

        let pause = match state {
            LoopState::Polling { tick } => {
                if let PublishOutcome::Emitted {
                    entries,
                    failed_subscribers,
                } = publisher.publish(tick).await
                {
                    debug!(
                        publisher = %publisher.name(),
                        tick,
                        entries,
                        failed_subscribers,
                        "batch delivered"
                    );
                }
                config.min_interval
            }
            LoopState::Idle => config.clock_interval,
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    debug!(publisher = %publisher.name(), "publisher loop stopped");
    publisher
}
