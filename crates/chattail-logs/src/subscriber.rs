use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use chattail_types::Entry;

/// New entries from one publish cycle, delivered as a unit
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    publisher: String,
    tick: u64,
    emitted_at: DateTime<Utc>,
    entries: Vec<Entry>,
}

impl Batch {
    pub fn new(publisher: impl Into<String>, tick: u64, entries: Vec<Entry>) -> Self {
        Self {
            publisher: publisher.into(),
            tick,
            emitted_at: Utc::now(),
            entries,
        }
    }

    /// Name of the publisher that produced this batch
    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    /// Source tick the batch was fetched on
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One formatted line per entry
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(Entry::line)
    }

    /// All lines joined with newlines
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("failed to write to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to stdout")]
    Stdout(#[source] io::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("subscriber is closed")]
    Closed,
}

/// Receives every batch a publisher emits.
///
/// A subscriber owns whatever resource it writes to and must release it in
/// `close`, which the registry calls exactly once.
pub trait Subscriber: Send {
    /// Short label used in logs
    fn name(&self) -> &str;

    fn notify(&mut self, batch: &Batch) -> Result<(), SubscriberError>;

    fn close(&mut self) -> Result<(), SubscriberError> {
        Ok(())
    }
}

/// Ordered set of subscribers for one publisher
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<Box<dyn Subscriber>>,
    closed: bool,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber; notification follows registration order
    pub fn register(&mut self, subscriber: impl Subscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Deliver a batch to every subscriber in order.
    ///
    /// A failing subscriber is logged and skipped; the rest still run.
    /// Returns the number of failures.
    pub fn notify_all(&mut self, batch: &Batch) -> usize {
        if self.closed {
            debug!(publisher = batch.publisher(), "registry closed, dropping batch");
            return 0;
        }

        let mut failures = 0;
        for subscriber in &mut self.subscribers {
            if let Err(e) = subscriber.notify(batch) {
                failures += 1;
                warn!(
                    publisher = batch.publisher(),
                    subscriber = subscriber.name(),
                    error = %e,
                    "subscriber failed"
                );
            }
        }
        failures
    }

    /// Close every subscriber once, in registration order.
    ///
    /// Every subscriber gets its `close` call even if an earlier one fails.
    /// Later calls are no-ops. Returns the number of failures.
    pub fn close_all(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;

        let mut failures = 0;
        for subscriber in &mut self.subscribers {
            if let Err(e) = subscriber.close() {
                failures += 1;
                warn!(subscriber = subscriber.name(), error = %e, "failed to close subscriber");
            }
        }
        failures
    }
}

impl Drop for SubscriberRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.subscribers.iter().map(|s| s.name()).collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &names)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Prints each batch's text to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl Subscriber for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn notify(&mut self, batch: &Batch) -> Result<(), SubscriberError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", batch.text()).map_err(SubscriberError::Stdout)?;
        out.flush().map_err(SubscriberError::Stdout)
    }
}

/// Appends batches to a file, one timestamped line per entry
pub struct FileSink {
    path: PathBuf,
    name: String,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open (or create) the file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SubscriberError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SubscriberError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SubscriberError {
        SubscriberError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Subscriber for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, batch: &Batch) -> Result<(), SubscriberError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(SubscriberError::Closed);
        };

        let ts = batch
            .emitted_at()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let result = batch
            .lines()
            .try_for_each(|line| writeln!(writer, "{} [{}] {}", ts, batch.publisher(), line))
            .and_then(|()| writer.flush());

        result.map_err(|e| self.io_error(e))
    }

    fn close(&mut self) -> Result<(), SubscriberError> {
        match self.writer.take() {
            Some(mut writer) => writer.flush().map_err(|e| self.io_error(e)),
            None => Ok(()),
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Best effort cleanup on drop
        let _ = self.close();
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

/// Wraps a closure as a subscriber
pub struct CallbackSink<F> {
    name: String,
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&Batch) -> Result<(), SubscriberError> + Send,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> Subscriber for CallbackSink<F>
where
    F: FnMut(&Batch) -> Result<(), SubscriberError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, batch: &Batch) -> Result<(), SubscriberError> {
        (self.callback)(batch)
    }
}

/// Collects batches in memory; clones share the same storage
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Batch>>>,
    closes: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    /// Every received entry, flattened in delivery order
    pub fn entries(&self) -> Vec<Entry> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.entries().iter().cloned())
            .collect()
    }

    /// How many times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Subscriber for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn notify(&mut self, batch: &Batch) -> Result<(), SubscriberError> {
        self.batches.lock().push(batch.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SubscriberError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
