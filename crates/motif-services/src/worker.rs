//! Pattern generation off the real-time thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use motif_core::{generate_best, GenerationParams, TemplateLibrary};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::pattern_cell::PatternCell;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn generation thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One generation job: best-of-N from `params.seed`, committed at `anchor_step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRequest {
    pub params: GenerationParams,
    pub root: u8,
    pub velocity: u8,
    pub channel: u8,
    pub anchor_step: i64,
    pub candidates: u32,
}

impl GenerationRequest {
    fn run(&self, library: &TemplateLibrary, cell: &PatternCell) -> u64 {
        let best = generate_best(
            &self.params,
            self.root as i32,
            self.velocity as i32,
            self.channel,
            library,
            self.candidates,
        );
        let notes = best.pattern.notes.len();
        let revision = cell.commit_generated(best.pattern, self.anchor_step);
        info!(
            revision,
            seed = best.seed,
            score = best.score,
            notes,
            kind = %self.params.kind,
            anchor = self.anchor_step,
            "Pattern generated"
        );
        revision
    }
}

/// Where the engine sends generation requests
pub trait GenerationService: Send {
    /// Queue or run a request. Returns false if it was dropped.
    /// Must not block when called from the audio thread.
    fn submit(&self, request: GenerationRequest) -> bool;
}

/// Generates synchronously inside `submit`. For offline rendering and tests.
pub struct InlineGeneration {
    library: Arc<TemplateLibrary>,
    cell: Arc<PatternCell>,
}

impl InlineGeneration {
    pub fn new(library: Arc<TemplateLibrary>, cell: Arc<PatternCell>) -> Self {
        Self { library, cell }
    }
}

impl GenerationService for InlineGeneration {
    fn submit(&self, request: GenerationRequest) -> bool {
        request.run(&self.library, &self.cell);
        true
    }
}

/// Dedicated generation thread fed by a bounded queue.
///
/// Requests dropped on a full queue are only counted by `submit`; the
/// generator thread reports them when it picks up its next request.
pub struct GenerationWorker {
    tx: Option<Sender<GenerationRequest>>,
    handle: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl GenerationWorker {
    pub fn spawn(
        library: Arc<TemplateLibrary>,
        cell: Arc<PatternCell>,
        queue_capacity: usize,
    ) -> Result<Self, WorkerError> {
        let (tx, rx) = bounded::<GenerationRequest>(queue_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let thread_dropped = dropped.clone();
        let handle = thread::Builder::new()
            .name("motif-generator".into())
            .spawn(move || Self::run_loop(rx, library, cell, thread_dropped))?;

        info!(queue_capacity, "Generation worker started");
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            dropped,
        })
    }

    fn run_loop(
        rx: Receiver<GenerationRequest>,
        library: Arc<TemplateLibrary>,
        cell: Arc<PatternCell>,
        dropped: Arc<AtomicU64>,
    ) {
        let mut reported = 0;
        let report = |reported: &mut u64| {
            let total = dropped.load(Ordering::Relaxed);
            if total > *reported {
                warn!(dropped = total - *reported, total, "Generation queue was full, requests dropped");
                *reported = total;
            }
        };
        while let Ok(request) = rx.recv() {
            report(&mut reported);
            debug!(seed = request.params.seed, "Generation request received");
            request.run(&library, &cell);
        }
        report(&mut reported);
        info!("Generation worker stopped");
    }

    /// Requests dropped so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Finish queued requests and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Generation worker panicked");
        }
    }
}

impl GenerationService for GenerationWorker {
    fn submit(&self, request: GenerationRequest) -> bool {
        let Some(tx) = &self.tx else { return false };
        match tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(seed = request.params.seed, "Generation queue full, request dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Generation worker is gone, request dropped");
                false
            }
        }
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use motif_core::GenerationType;

    use super::*;

    static LIBRARY: LazyLock<Arc<TemplateLibrary>> = LazyLock::new(|| Arc::new(TemplateLibrary::builtin()));

    fn request(seed: u32, anchor_step: i64) -> GenerationRequest {
        GenerationRequest {
            params: GenerationParams { kind: GenerationType::Melody, seed, ..Default::default() },
            root: 60,
            velocity: 100,
            channel: 1,
            anchor_step,
            candidates: 3,
        }
    }

    #[test]
    fn test_inline_generation_commits() {
        let cell = Arc::new(PatternCell::new());
        let service = InlineGeneration::new(LIBRARY.clone(), cell.clone());
        assert!(service.submit(request(11, 32)));

        let snap = cell.snapshot();
        assert_eq!(snap.revision, 1);
        assert_eq!(snap.anchor_step, Some(32));
        let expected = generate_best(&request(11, 0).params, 60, 100, 1, &LIBRARY, 3);
        assert_eq!(*snap.pattern, expected.pattern);
    }

    #[test]
    fn test_worker_processes_queue_before_shutdown() {
        let cell = Arc::new(PatternCell::new());
        let worker = GenerationWorker::spawn(LIBRARY.clone(), cell.clone(), 8).unwrap();
        let accepted = (0..4).filter(|i| worker.submit(request(*i, *i as i64 * 16))).count();
        worker.shutdown();

        assert_eq!(cell.revision(), accepted as u64);
        assert!(accepted >= 1);
    }

    #[test]
    fn test_full_queue_drops_requests() {
        let cell = Arc::new(PatternCell::new());
        let worker = GenerationWorker::spawn(LIBRARY.clone(), cell.clone(), 1).unwrap();
        // The worker holds at most one request in flight plus one queued
        let accepted = (0..64).filter(|i| worker.submit(request(*i, 0))).count();
        assert!(accepted < 64);
        assert_eq!(worker.dropped(), 64 - accepted as u64);
        worker.shutdown();
        assert_eq!(cell.revision(), accepted as u64);
    }
}
