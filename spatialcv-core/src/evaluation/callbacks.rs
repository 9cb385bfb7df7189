//! Fold callbacks: progress reporting as folds finish.

use super::report::FoldResult;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer notified as each fold finishes. Folds may finish in any order.
pub trait FoldCallback: Send + Sync {
    fn on_fold_end(&self, result: &FoldResult, completed: usize, total: usize);
}

/// Logs one line per finished fold.
#[derive(Debug, Default)]
pub struct LoggingCallback;

impl FoldCallback for LoggingCallback {
    fn on_fold_end(&self, result: &FoldResult, completed: usize, total: usize) {
        match result.score {
            Some(score) => tracing::info!(
                fold = result.fold,
                score,
                n_train = result.n_train,
                n_test = result.n_test,
                "Fold {completed}/{total} scored"
            ),
            None => tracing::info!(
                fold = result.fold,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Fold {completed}/{total} failed"
            ),
        }
    }
}

/// Counts finished and failed folds.
#[derive(Debug, Default)]
pub struct CountingCallback {
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl CountingCallback {
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl FoldCallback for CountingCallback {
    fn on_fold_end(&self, result: &FoldResult, _completed: usize, _total: usize) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        if !result.is_scored() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
