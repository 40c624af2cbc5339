//! Hooks into the training loop.
//!
//! Callbacks are registered on a [`TrainingSession`](crate::training::TrainingSession)
//! before it runs and are invoked in registration order.

use std::path::{Path, PathBuf};

/// Why a trial did not train.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The image or its transcript could not be read.
    Unreadable,
    /// Empty or constant line image.
    Degenerate,
    /// The transcript holds a character outside the codec.
    UnknownSymbol,
    /// Too few frames for the labels, or more frames than the network takes.
    Length,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrialOutcome {
    Trained {
        /// RMS alignment error divided by the label count.
        error: f64,
        distance: usize,
        labels: usize,
    },
    Skipped(SkipReason),
    /// A numeric fault reloaded the model from the recovery point.
    Recovered,
}

/// What happened during one trial.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialReport {
    pub trial: usize,
    pub path: Option<PathBuf>,
    pub outcome: TrialOutcome,
    /// Whether the weights were updated.
    pub updated: bool,
    pub truth: Option<String>,
    pub aligned: Option<String>,
    pub output: Option<String>,
}

impl TrialReport {
    pub fn new(trial: usize, outcome: TrialOutcome) -> Self {
        Self {
            trial,
            path: None,
            outcome,
            updated: false,
            truth: None,
            aligned: None,
            output: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    /// Trials the loop went through, skipped ones included.
    pub trials: usize,
    pub trained: usize,
    pub skipped: usize,
    pub recoveries: usize,
    pub checkpoints: Vec<PathBuf>,
    /// `last_trial` of the recognizer when the loop ended.
    pub last_trial: usize,
}

/// Implement the events you care about; every method defaults to a no-op.
pub trait TrainingCallback {
    /// Called once with the trial range about to run.
    fn on_train_begin(&mut self, _start: usize, _ntrain: usize) {}

    fn on_trial_end(&mut self, _report: &TrialReport) {}

    /// Called after a checkpoint for `trial` trials was written.
    fn on_checkpoint(&mut self, _trial: usize, _path: &Path) {}

    /// Called after the model was reloaded during `trial`.
    fn on_recovery(&mut self, _trial: usize) {}

    fn on_train_end(&mut self, _summary: &TrainingSummary) {}

    fn name(&self) -> &str {
        "TrainingCallback"
    }
}
