//! The shared current pattern, swapped atomically as immutable snapshots

use std::sync::{Arc, Mutex};

use motif_core::GeneratedPattern;

/// One published pattern
#[derive(Debug, Clone)]
pub struct PatternSnapshot {
    pub pattern: Arc<GeneratedPattern>,
    /// Bumped on every commit
    pub revision: u64,
    /// Absolute step playback should restart from, if this commit re-anchors
    pub anchor_step: Option<i64>,
}

impl Default for PatternSnapshot {
    fn default() -> Self {
        Self {
            pattern: Arc::new(GeneratedPattern::default()),
            revision: 0,
            anchor_step: None,
        }
    }
}

/// Holder of the current pattern.
///
/// The lock is held only to clone or replace an `Arc`, so readers on the
/// audio thread never wait on generation or editing.
#[derive(Debug, Default)]
pub struct PatternCell {
    inner: Mutex<PatternSnapshot>,
}

impl PatternCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PatternSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Current snapshot, or `None` if a writer holds the lock right now
    pub fn try_snapshot(&self) -> Option<PatternSnapshot> {
        self.inner.try_lock().ok().map(|guard| guard.clone())
    }

    pub fn revision(&self) -> u64 {
        self.snapshot().revision
    }

    pub fn pattern(&self) -> Arc<GeneratedPattern> {
        self.snapshot().pattern
    }

    /// Publish a freshly generated pattern that restarts at `anchor_step`
    pub fn commit_generated(&self, pattern: GeneratedPattern, anchor_step: i64) -> u64 {
        self.publish(pattern, Some(anchor_step))
    }

    /// Publish an edited pattern; playback keeps its current anchor
    pub fn commit_edited(&self, pattern: GeneratedPattern) -> u64 {
        self.publish(pattern.normalized(), None)
    }

    fn publish(&self, pattern: GeneratedPattern, anchor_step: Option<i64>) -> u64 {
        let pattern = Arc::new(pattern);
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.revision += 1;
        guard.pattern = pattern;
        guard.anchor_step = anchor_step;
        guard.revision
    }
}
