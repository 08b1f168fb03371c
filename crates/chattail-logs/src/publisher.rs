use std::sync::Arc;

use tracing::{debug, warn};

use chattail_source::SnapshotSource;
use chattail_types::{Entry, Snapshot};

use crate::aligner::{AlignPath, AlignerConfig, AlignerConfigError, WindowAligner};
use crate::filter::{CompiledFilter, FilterFn, FilterPresets};
use crate::poller::{SourceClock, SourcePoller};
use crate::subscriber::{Batch, Subscriber, SubscriberRegistry};

/// Name used when none is given
pub const DEFAULT_PUBLISHER_NAME: &str = "messages";

/// What one publish cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The source could not be read; state was left untouched
    Unavailable,

    /// Nothing new since the last cycle
    Quiet,

    /// A batch was delivered
    Emitted {
        entries: usize,
        failed_subscribers: usize,
    },
}

/// Runs the fetch, filter, reconcile, notify cycle for one buffer
pub struct Publisher {
    name: String,
    poller: SourcePoller,
    filter: Option<FilterFn>,
    aligner: WindowAligner,
    subscribers: SubscriberRegistry,
    every_ticks: u64,
}

impl Publisher {
    /// Create a publisher with no filter and no subscribers
    pub fn new(
        name: impl Into<String>,
        poller: SourcePoller,
        config: AlignerConfig,
    ) -> Result<Self, AlignerConfigError> {
        Ok(Self::with_aligner(name, poller, WindowAligner::new(config)?))
    }

    /// Public chat from player-authored entries, with the stock buffer sizing
    pub fn public_chat(source: Arc<dyn SnapshotSource>, buffer: impl Into<String>) -> Self {
        let poller = SourcePoller::new(source, buffer);
        Self::with_aligner("public-chat", poller, WindowAligner::with_defaults())
            .with_compiled_filter(FilterPresets::public_chat())
    }

    fn with_aligner(name: impl Into<String>, poller: SourcePoller, aligner: WindowAligner) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                DEFAULT_PUBLISHER_NAME.to_string()
            } else {
                name
            },
            poller,
            filter: None,
            aligner,
            subscribers: SubscriberRegistry::new(),
            every_ticks: 1,
        }
    }

    /// Keep only entries the predicate accepts
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Entry) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_compiled_filter(mut self, filter: CompiledFilter) -> Self {
        self.filter = if filter.is_empty() {
            None
        } else {
            Some(filter.into_predicate())
        };
        self
    }

    /// Poll at most once every `ticks` source ticks
    pub fn with_every_ticks(mut self, ticks: u64) -> Self {
        self.every_ticks = ticks.max(1);
        self
    }

    pub fn with_subscriber(mut self, subscriber: impl Subscriber + 'static) -> Self {
        self.add_subscriber(subscriber);
        self
    }

    pub fn add_subscriber(&mut self, subscriber: impl Subscriber + 'static) {
        self.subscribers.register(subscriber);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn every_ticks(&self) -> u64 {
        self.every_ticks
    }

    pub fn aligner(&self) -> &WindowAligner {
        &self.aligner
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Handle for reading the source's tick counter
    pub fn clock(&self) -> SourceClock {
        self.poller.clock()
    }

    /// Run one full cycle and deliver any new entries as a single batch
    pub async fn publish(&mut self, tick: u64) -> PublishOutcome {
        let snapshot = match self.poller.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_unreachable() => {
                warn!(publisher = %self.name, error = %e, "source unavailable, skipping cycle");
                return PublishOutcome::Unavailable;
            }
            // Usually a document caught mid-write; the next cycle reads it whole
            Err(e) => {
                debug!(publisher = %self.name, error = %e, "unreadable snapshot, skipping cycle");
                return PublishOutcome::Unavailable;
            }
        };

        let fetched = snapshot.len();
        let snapshot: Snapshot = match &self.filter {
            Some(keep) => snapshot.into_iter().filter(|entry| keep(entry)).collect(),
            None => snapshot,
        };

        let reconciled = self.aligner.reconcile(&snapshot);
        match reconciled.path {
            AlignPath::FailOpen if !reconciled.entries.is_empty() => {
                warn!(
                    publisher = %self.name,
                    entries = reconciled.entries.len(),
                    "no overlap with history, treating whole snapshot as new"
                );
            }
            AlignPath::Realigned { offset } => {
                debug!(publisher = %self.name, offset, "realigned after buffer eviction");
            }
            _ => {}
        }

        debug!(
            publisher = %self.name,
            tick,
            fetched,
            kept = snapshot.len(),
            new = reconciled.entries.len(),
            "cycle complete"
        );

        if reconciled.entries.is_empty() {
            return PublishOutcome::Quiet;
        }

        let batch = Batch::new(self.name.as_str(), tick, reconciled.entries);
        let failed_subscribers = self.subscribers.notify_all(&batch);

        PublishOutcome::Emitted {
            entries: batch.len(),
            failed_subscribers,
        }
    }

    /// Release every subscriber's resources; only the first call does anything
    pub fn close(&mut self) -> usize {
        self.subscribers.close_all()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("poller", &self.poller)
            .field("filtered", &self.filter.is_some())
            .field("aligner", &self.aligner)
            .field("subscribers", &self.subscribers)
            .field("every_ticks", &self.every_ticks)
            .finish()
    }
}
