use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use chattail_types::Entry;

/// Entries retained from the previous snapshot
pub const DEFAULT_HISTORY: usize = 100;

/// Consecutive entries compared as one unit during realignment
pub const DEFAULT_WINDOW: usize = 10;

/// Retention cap of the client's chat buffer
pub const DEFAULT_MAX_LENGTH: usize = 100;

/// Sizing for one aligner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignerConfig {
    /// Maximum retained history (`H`)
    pub history: usize,

    /// Alignment window size (`W`)
    pub window: usize,

    /// Length at which the source may start evicting from the front
    pub max_length: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY,
            window: DEFAULT_WINDOW,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl AlignerConfig {
    pub fn validate(&self) -> Result<(), AlignerConfigError> {
        if self.window == 0 {
            return Err(AlignerConfigError::ZeroWindow);
        }
        if self.history < self.window {
            return Err(AlignerConfigError::HistoryTooSmall {
                history: self.history,
                window: self.window,
            });
        }
        if self.max_length == 0 {
            return Err(AlignerConfigError::ZeroMaxLength);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignerConfigError {
    #[error("alignment window must be at least 1")]
    ZeroWindow,

    #[error("history ({history}) must hold at least one alignment window ({window})")]
    HistoryTooSmall { history: usize, window: usize },

    #[error("max length must be at least 1")]
    ZeroMaxLength,
}

/// How a batch of new entries was located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignPath {
    /// Snapshot grew by appending; new entries start at the old cursor
    Append,

    /// Previously seen content was found again starting at `offset`
    Realigned { offset: usize },

    /// No shared window with history; the whole snapshot was taken as new
    FailOpen,
}

/// Result of one reconcile call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// New entries, in source order
    pub entries: Vec<Entry>,

    pub path: AlignPath,
}

/// Finds the genuinely new suffix of each snapshot of a bounded buffer.
///
/// A length cursor alone is enough while the buffer only grows. Once the
/// source starts evicting from the front the length stops moving, so the
/// aligner falls back to locating the retained history inside the new
/// snapshot by hashing runs of `window` consecutive entries.
pub struct WindowAligner {
    config: AlignerConfig,

    /// Tail of the previous snapshot, at most `config.history` long
    history: Vec<Entry>,

    /// Length of the previous snapshot; everything before it was emitted
    cursor: usize,
}

impl WindowAligner {
    pub fn new(config: AlignerConfig) -> Result<Self, AlignerConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            history: Vec::with_capacity(config.history),
            cursor: 0,
        })
    }

    /// Aligner with the stock chat buffer sizing
    pub fn with_defaults() -> Self {
        let config = AlignerConfig::default();
        Self {
            config,
            history: Vec::with_capacity(config.history),
            cursor: 0,
        }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Retained history, oldest first
    pub fn history(&self) -> &[Entry] {
        &self.history
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Compare a fresh snapshot against the retained history and return the
    /// entries that were not seen before.
    pub fn reconcile(&mut self, snapshot: &[Entry]) -> Reconciled {
        let (start, path) = if self.is_pure_append(snapshot) {
            (self.cursor, AlignPath::Append)
        } else {
            match self.find_resume(snapshot) {
                Some((offset, resume)) => (resume, AlignPath::Realigned { offset }),
                // Below capacity the buffer can only have dropped entries from
                // the front, so the history tail may still open the snapshot
                None if snapshot.len() < self.config.max_length => {
                    match self.find_head_overlap(snapshot) {
                        Some(resume) => (resume, AlignPath::Realigned { offset: 0 }),
                        None => (0, AlignPath::FailOpen),
                    }
                }
                None => (0, AlignPath::FailOpen),
            }
        };

        let entries = snapshot[start..].to_vec();
        self.remember(snapshot);

        Reconciled { entries, path }
    }

    /// Forget everything, as if no snapshot had been seen
    pub fn reset(&mut self) {
        self.history.clear();
        self.cursor = 0;
    }

    /// Whether the snapshot is the previous one with entries appended
    fn is_pure_append(&self, snapshot: &[Entry]) -> bool {
        // Nothing seen yet: everything is new regardless of length
        if self.cursor == 0 {
            return true;
        }
        if snapshot.len() >= self.config.max_length || self.cursor > snapshot.len() {
            return false;
        }

        let Some(start) = self.cursor.checked_sub(self.history.len()) else {
            return false;
        };
        same_run(&snapshot[start..self.cursor], &self.history)
    }

    /// Locate where the retained history resumes inside `snapshot`.
    ///
    /// Returns the alignment offset and the index of the first entry that
    /// was not already emitted.
    fn find_resume(&self, snapshot: &[Entry]) -> Option<(usize, usize)> {
        let window = self.config.window;
        if self.history.len() < window || snapshot.len() < window {
            return None;
        }

        let mut lookup: HashMap<u64, Vec<usize>> =
            HashMap::with_capacity(self.history.len() - window + 1);
        for (offset, run) in self.history.windows(window).enumerate() {
            lookup.entry(window_hash(run)).or_default().push(offset);
        }

        for (offset, run) in snapshot.windows(window).enumerate() {
            let Some(candidates) = lookup.get(&window_hash(run)) else {
                continue;
            };

            // Candidates are ascending, so the longest overlap is tried first
            for &history_offset in candidates {
                let overlap = self.history.len() - history_offset;
                let resume = (offset + overlap).min(snapshot.len());
                let seen = &self.history[history_offset..history_offset + (resume - offset)];
                if same_run(&snapshot[offset..resume], seen) {
                    return Some((offset, resume));
                }
            }
        }

        None
    }

    /// Length of the longest history tail that `snapshot` starts with.
    ///
    /// Catches overlaps shorter than one window, which the hash lookup
    /// cannot see.
    fn find_head_overlap(&self, snapshot: &[Entry]) -> Option<usize> {
        let longest = self.history.len().min(snapshot.len());
        (1..=longest).rev().find(|&len| {
            same_run(&self.history[self.history.len() - len..], &snapshot[..len])
        })
    }

    fn remember(&mut self, snapshot: &[Entry]) {
        let keep_from = snapshot.len().saturating_sub(self.config.history);
        self.history.clear();
        self.history.extend_from_slice(&snapshot[keep_from..]);
        self.cursor = snapshot.len();
    }
}

impl std::fmt::Debug for WindowAligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowAligner")
            .field("config", &self.config)
            .field("history_len", &self.history.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Content hash of a run of entries over `(display_name, value)`
fn window_hash(run: &[Entry]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for entry in run {
        entry.display_name.hash(&mut hasher);
        entry.value.hash(&mut hasher);
    }
    hasher.finish()
}

fn same_run(a: &[Entry], b: &[Entry]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chattail_types::Category;

    fn msg(i: usize) -> Entry {
        Entry::new(format!("message {}", i), Category::PublicChat).with_display_name("Bob")
    }

    fn msgs(range: std::ops::Range<usize>) -> Vec<Entry> {
        range.map(msg).collect()
    }

    fn config(history: usize, window: usize, max_length: usize) -> AlignerConfig {
        AlignerConfig {
            history,
            window,
            max_length,
        }
    }

    #[test]
    fn test_pure_append() {
        let mut aligner = WindowAligner::with_defaults();
        let first = msgs(0..5);
        assert_eq!(aligner.reconcile(&first).entries, first);

        let second = msgs(0..8);
        let result = aligner.reconcile(&second);
        assert_eq!(result.entries, msgs(5..8));
        assert_eq!(result.path, AlignPath::Append);
    }

    #[test]
    fn test_unchanged_snapshot_is_quiet() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..5));
        assert!(aligner.reconcile(&msgs(0..5)).entries.is_empty());
    }

    #[test]
    fn test_steady_growth_has_no_duplicates() {
        let mut aligner = WindowAligner::with_defaults();
        let mut emitted = Vec::new();
        for len in [0, 1, 3, 3, 7, 20, 42, 99] {
            emitted.extend(aligner.reconcile(&msgs(0..len)).entries);
        }
        assert_eq!(emitted, msgs(0..99));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut aligner = WindowAligner::new(config(20, 5, 50)).unwrap();
        for end in (10usize..400).step_by(7) {
            let start = end.saturating_sub(50);
            aligner.reconcile(&msgs(start..end));
            assert!(aligner.history().len() <= 20);
        }
        assert_eq!(aligner.cursor(), 50);
    }

    #[test]
    fn test_alignment_after_full_window() {
        let mut aligner = WindowAligner::new(config(10, 10, 10)).unwrap();
        let seen = msgs(0..10);
        aligner.reconcile(&seen);

        let mut next = seen.clone();
        next.extend(msgs(10..12));
        let result = aligner.reconcile(&next);
        assert_eq!(result.entries, msgs(10..12));
        assert_eq!(result.path, AlignPath::Realigned { offset: 0 });
    }

    #[test]
    fn test_alignment_after_eviction() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..100));

        // Source evicted the first 3 and appended 3
        let result = aligner.reconcile(&msgs(3..103));
        assert_eq!(result.entries, msgs(100..103));
        assert_eq!(result.path, AlignPath::Realigned { offset: 0 });
        assert_eq!(aligner.history(), msgs(3..103).as_slice());
    }

    #[test]
    fn test_alignment_when_history_shorter_than_buffer() {
        let mut aligner = WindowAligner::new(config(20, 5, 100)).unwrap();
        aligner.reconcile(&msgs(0..100));

        // History only covers 80..100, so the match is found mid-snapshot
        let result = aligner.reconcile(&msgs(10..110));
        assert_eq!(result.entries, msgs(100..110));
        assert_eq!(result.path, AlignPath::Realigned { offset: 70 });
    }

    #[test]
    fn test_full_eviction_fails_open() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..100));

        let fresh = msgs(500..600);
        let result = aligner.reconcile(&fresh);
        assert_eq!(result.entries, fresh);
        assert_eq!(result.path, AlignPath::FailOpen);
        assert_eq!(aligner.cursor(), 100);
    }

    #[test]
    fn test_disjoint_short_snapshot_fails_open() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..30));

        // Buffer was cleared and refilled with unrelated content
        let fresh = msgs(200..203);
        let result = aligner.reconcile(&fresh);
        assert_eq!(result.entries, fresh);
        assert_eq!(result.path, AlignPath::FailOpen);
        assert_eq!(aligner.cursor(), 3);
    }

    #[test]
    fn test_overlap_shorter_than_window_fails_open() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..100));

        // Only 5 old entries survive: less than one window, so they come back
        let result = aligner.reconcile(&msgs(95..195));
        assert_eq!(result.path, AlignPath::FailOpen);
        assert_eq!(result.entries.len(), 100);
    }

    #[test]
    fn test_sparse_history_survives_front_eviction() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..3));

        // Oldest entry dropped out and nothing new arrived
        let result = aligner.reconcile(&msgs(1..3));
        assert!(result.entries.is_empty());
        assert_eq!(result.path, AlignPath::Realigned { offset: 0 });

        // Another eviction together with one new entry
        let result = aligner.reconcile(&msgs(2..4));
        assert_eq!(result.entries, msgs(3..4));
        assert_eq!(result.path, AlignPath::Realigned { offset: 0 });
        assert_eq!(aligner.history(), msgs(2..4).as_slice());
    }

    #[test]
    fn test_short_overlap_at_capacity_still_fails_open() {
        let mut aligner = WindowAligner::new(config(10, 5, 10)).unwrap();
        aligner.reconcile(&msgs(0..10));

        let result = aligner.reconcile(&msgs(7..17));
        assert_eq!(result.path, AlignPath::FailOpen);
        assert_eq!(result.entries, msgs(7..17));
    }

    #[test]
    fn test_repeated_content_is_not_reemitted() {
        let spam = |value: &str| Entry::new(value, Category::PublicChat).with_display_name("Spammer");
        let mut aligner = WindowAligner::new(config(6, 2, 6)).unwrap();
        aligner.reconcile(&vec![spam("x"); 6]);

        let mut next = vec![spam("x"); 5];
        next.push(spam("y"));
        let result = aligner.reconcile(&next);
        assert_eq!(result.entries, vec![spam("y")]);
    }

    #[test]
    fn test_shrunk_buffer_realigns() {
        let mut aligner = WindowAligner::new(config(50, 3, 100)).unwrap();
        aligner.reconcile(&msgs(0..40));

        // Client trimmed the buffer to its last 20 and appended 2
        let result = aligner.reconcile(&msgs(20..42));
        assert_eq!(result.entries, msgs(40..42));
        assert_eq!(result.path, AlignPath::Realigned { offset: 0 });
    }

    #[test]
    fn test_emptied_buffer_resets_cursor() {
        let mut aligner = WindowAligner::with_defaults();
        aligner.reconcile(&msgs(0..10));

        assert!(aligner.reconcile(&[]).entries.is_empty());
        assert_eq!(aligner.cursor(), 0);

        let result = aligner.reconcile(&msgs(10..12));
        assert_eq!(result.entries, msgs(10..12));
        assert_eq!(result.path, AlignPath::Append);
    }

    #[test]
    fn test_first_snapshot_at_capacity_is_taken_whole() {
        let mut aligner = WindowAligner::with_defaults();
        let result = aligner.reconcile(&msgs(0..100));
        assert_eq!(result.entries.len(), 100);
        assert_eq!(result.path, AlignPath::Append);
    }

    #[test]
    fn test_scenario_one_at_a_time_then_eviction() {
        let mut aligner = WindowAligner::with_defaults();

        for len in 1..=99 {
            let result = aligner.reconcile(&msgs(0..len));
            assert_eq!(result.entries, vec![msg(len - 1)]);
        }

        // 100th entry fills the buffer
        let result = aligner.reconcile(&msgs(0..100));
        assert_eq!(result.entries, vec![msg(99)]);

        // 101st entry evicts the first
        let result = aligner.reconcile(&msgs(1..101));
        assert_eq!(result.entries, vec![msg(100)]);
        assert!(aligner.history().len() <= DEFAULT_HISTORY);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            WindowAligner::new(config(10, 0, 10)).unwrap_err(),
            AlignerConfigError::ZeroWindow
        );
        assert_eq!(
            WindowAligner::new(config(5, 10, 10)).unwrap_err(),
            AlignerConfigError::HistoryTooSmall {
                history: 5,
                window: 10
            }
        );
        assert_eq!(
            WindowAligner::new(config(10, 10, 0)).unwrap_err(),
            AlignerConfigError::ZeroMaxLength
        );
        assert!(AlignerConfig::default().validate().is_ok());
    }
}
