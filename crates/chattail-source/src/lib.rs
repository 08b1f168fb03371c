//! Snapshot sources for chattail
//!
//! This crate defines how the pipeline reads the external client's bounded
//! message buffers and its tick counter.

mod error;
mod file;
mod scripted;

pub use error::SourceError;
pub use file::{FileSource, SnapshotDocument};
pub use scripted::ScriptedSource;

// Re-export types used in our public API
pub use chattail_types::{RawEntry, RawSnapshot};

/// A live view into the external client's message buffers.
///
/// Both calls are blocking and may be slow; callers bound them with a
/// timeout. Implementations must tolerate concurrent reads from several
/// publishers.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Full current contents of one buffer, oldest first.
    ///
    /// A buffer the client has not created yet is empty, not an error.
    fn snapshot(&self, buffer: &str) -> Result<RawSnapshot, SourceError>;

    /// Current value of the client's tick counter
    fn tick(&self) -> Result<u64, SourceError>;
}
