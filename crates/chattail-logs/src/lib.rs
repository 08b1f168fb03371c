//! Message processing for chattail
//!
//! This crate turns repeated snapshots of a bounded message buffer into a
//! stream of new entries: cleaning, classification, filtering, windowed
//! realignment, delivery to subscribers and the polling loop that drives it.

mod aligner;
mod classifier;
mod filter;
mod normalizer;
mod poller;
mod publisher;
mod scheduler;
mod subscriber;

pub use aligner::{
    AlignPath, AlignerConfig, AlignerConfigError, DEFAULT_HISTORY, DEFAULT_MAX_LENGTH,
    DEFAULT_WINDOW, Reconciled, WindowAligner,
};
pub use classifier::{ClassifyFn, classify, resolve_category};
pub use filter::{CompiledFilter, FilterError, FilterFn, FilterPresets};
pub use normalizer::{NormalizeFn, normalize, normalize_optional};
pub use poller::{DEFAULT_FETCH_TIMEOUT, SourceClock, SourcePoller};
pub use publisher::{DEFAULT_PUBLISHER_NAME, PublishOutcome, Publisher};
pub use scheduler::{
    DEFAULT_CLOCK_INTERVAL, DEFAULT_MIN_INTERVAL, LoopState, Scheduler, SchedulerConfig,
    ShutdownReport, TickCadence,
};
pub use subscriber::{
    Batch, CallbackSink, FileSink, MemorySink, StdoutSink, Subscriber, SubscriberError,
    SubscriberRegistry,
};

// Re-export types used in our public API
pub use chattail_types::{Category, Entry, RawEntry, Snapshot};
