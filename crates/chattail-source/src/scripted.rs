use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::{RawEntry, RawSnapshot, SnapshotSource, SourceError};

/// In-memory source that behaves like the client's circular buffers.
///
/// Each buffer holds at most `capacity` entries and evicts from the front
/// once full. Clones share state, so a test can keep one handle to drive
/// the buffers while the pipeline reads through another.
#[derive(Clone)]
pub struct ScriptedSource {
    buffers: Arc<RwLock<HashMap<String, VecDeque<RawEntry>>>>,
    capacity: usize,
    tick: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl ScriptedSource {
    /// Create a source whose buffers keep at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            tick: Arc::new(AtomicU64::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append one entry, evicting the oldest if the buffer is full
    pub fn push(&self, buffer: &str, entry: RawEntry) {
        let mut buffers = self.buffers.write();
        let entries = buffers.entry(buffer.to_string()).or_default();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Replace a buffer's contents wholesale (truncated to capacity from the front)
    pub fn set(&self, buffer: &str, entries: Vec<RawEntry>) {
        let skip = entries.len().saturating_sub(self.capacity);
        let entries: VecDeque<_> = entries.into_iter().skip(skip).collect();
        self.buffers.write().insert(buffer.to_string(), entries);
    }

    /// Empty a buffer, as the client does on logout
    pub fn clear(&self, buffer: &str) {
        self.buffers.write().remove(buffer);
    }

    pub fn len(&self, buffer: &str) -> usize {
        self.buffers.read().get(buffer).map_or(0, VecDeque::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advance the tick counter by one and return the new value
    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make every call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("client offline".to_string()));
        }
        Ok(())
    }
}

impl SnapshotSource for ScriptedSource {
    fn snapshot(&self, buffer: &str) -> Result<RawSnapshot, SourceError> {
        self.check_online()?;
        Ok(self
            .buffers
            .read()
            .get(buffer)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn tick(&self) -> Result<u64, SourceError> {
        self.check_online()?;
        Ok(self.tick.load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("capacity", &self.capacity)
            .field("tick", &self.tick.load(Ordering::SeqCst))
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish()
    }
}
