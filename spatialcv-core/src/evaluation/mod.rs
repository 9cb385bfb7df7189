//! Model evaluation: concurrent per-fold scoring, callbacks, reports.

pub mod callbacks;
pub mod evaluator;
pub mod report;

pub use callbacks::{CountingCallback, FoldCallback, LoggingCallback};
pub use evaluator::{Evaluator, evaluate_fold};
pub use report::{CvReport, FoldResult, FoldStatus, ScoreSummary};
