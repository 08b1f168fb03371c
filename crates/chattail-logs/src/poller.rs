use std::sync::Arc;
use std::time::Duration;

use chattail_source::{SnapshotSource, SourceError};
use chattail_types::{Entry, RawEntry, Snapshot};

use crate::classifier::{ClassifyFn, classify, resolve_category};
use crate::normalizer::{NormalizeFn, normalize, normalize_optional};

/// Upper bound on a single call into the source
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Fetches one buffer from a shared source and turns it into clean entries
pub struct SourcePoller {
    source: Arc<dyn SnapshotSource>,
    buffer: String,
    timeout: Duration,
    normalize: NormalizeFn,
    classify: ClassifyFn,
}

impl SourcePoller {
    pub fn new(source: Arc<dyn SnapshotSource>, buffer: impl Into<String>) -> Self {
        Self {
            source,
            buffer: buffer.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            normalize,
            classify,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_normalizer(mut self, normalize: NormalizeFn) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_classifier(mut self, classify: ClassifyFn) -> Self {
        self.classify = classify;
        self
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the buffer and clean every entry, preserving source order
    pub async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let buffer = self.buffer.clone();
        let source = Arc::clone(&self.source);
        let raw = call_source(source, self.timeout, move |source| source.snapshot(&buffer)).await?;
        Ok(raw.iter().map(|entry| self.clean(entry)).collect())
    }

    /// Read the source's tick counter
    pub async fn tick(&self) -> Result<u64, SourceError> {
        self.clock().tick().await
    }

    /// A detached handle for reading the tick counter
    pub fn clock(&self) -> SourceClock {
        SourceClock {
            source: Arc::clone(&self.source),
            timeout: self.timeout,
        }
    }

    /// Normalize all text fields and resolve the category
    pub fn clean(&self, raw: &RawEntry) -> Entry {
        let display_name = normalize_optional(raw.name.as_deref(), self.normalize);
        let sender = normalize_optional(raw.sender.as_deref(), self.normalize);
        let value = (self.normalize)(&raw.value);
        let category = resolve_category(
            raw.kind.as_deref(),
            sender.as_deref(),
            display_name.as_deref(),
            self.classify,
        );

        Entry {
            display_name,
            value,
            sender,
            category,
        }
    }
}

/// Reads the source's tick counter independently of any publisher
#[derive(Clone)]
pub struct SourceClock {
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
}

impl SourceClock {
    pub async fn tick(&self) -> Result<u64, SourceError> {
        call_source(Arc::clone(&self.source), self.timeout, |source| source.tick()).await
    }
}

/// Run a blocking source call off the runtime, bounded by `timeout`.
///
/// A call that times out keeps running on the blocking pool; its result
/// is discarded.
async fn call_source<T, F>(
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
    f: F,
) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce(&dyn SnapshotSource) -> Result<T, SourceError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || f(source.as_ref()));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SourceError::Unavailable(format!("source call failed: {}", e))),
        Err(_) => Err(SourceError::Timeout(timeout)),
    }
}

impl std::fmt::Debug for SourcePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePoller")
            .field("buffer", &self.buffer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chattail_source::{RawSnapshot, ScriptedSource};
    use chattail_types::Category;

    struct SlowSource;

    impl SnapshotSource for SlowSource {
        fn snapshot(&self, _buffer: &str) -> Result<RawSnapshot, SourceError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Vec::new())
        }

        fn tick(&self) -> Result<u64, SourceError> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_fetch_cleans_and_classifies() {
        let source = ScriptedSource::new(10);
        source.push(
            "messages",
            RawEntry::new("<col=ff0000>hello\u{a0}world")
                .with_name("<img=2>Bob")
                .with_kind("PUBLICCHAT"),
        );
        source.push("messages", RawEntry::new("gz").with_name("Bob").with_sender("Clan"));
        source.push("messages", RawEntry::new("Welcome.").with_name(""));

        let poller = SourcePoller::new(Arc::new(source), "messages");
        let snapshot = poller.fetch().await.unwrap();

        assert_eq!(snapshot[0].display_name.as_deref(), Some("Bob"));
        assert_eq!(snapshot[0].value, "hello world");
        assert_eq!(snapshot[0].category, Category::PublicChat);
        assert_eq!(snapshot[1].category, Category::ClanChat);
        assert_eq!(snapshot[2].display_name, None);
        assert_eq!(snapshot[2].category, Category::GameMessage);
    }

    #[tokio::test]
    async fn test_custom_functions() {
        fn shout(raw: &str) -> String {
            raw.to_uppercase()
        }
        fn everything_is_trade(_: Option<&str>, _: Option<&str>) -> Category {
            Category::Trade
        }

        let source = ScriptedSource::new(10);
        source.push("messages", RawEntry::new("hi"));
        let poller = SourcePoller::new(Arc::new(source), "messages")
            .with_normalizer(shout)
            .with_classifier(everything_is_trade);

        let snapshot = poller.fetch().await.unwrap();
        assert_eq!(snapshot[0].value, "HI");
        assert_eq!(snapshot[0].category, Category::Trade);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let poller = SourcePoller::new(Arc::new(SlowSource), "messages")
            .with_timeout(Duration::from_millis(20));
        let err = poller.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
        assert_eq!(poller.tick().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_source() {
        let source = ScriptedSource::new(10);
        source.set_offline(true);
        let poller = SourcePoller::new(Arc::new(source), "messages");
        assert!(poller.fetch().await.is_err());
        assert!(poller.tick().await.is_err());
    }
}
