use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use log::{info, warn};

use crate::{
    checkpoint::{read_state, write_state, ModelState},
    error::CheckpointError,
    line_norm::CenterNormalizer,
    model::recognizer::{Recognizer, StepConfig},
    training::TrainingConfig,
    utils::label_converter::Codec,
};

/// Where training resumes after a numeric fault.
#[derive(Clone, Debug)]
pub enum RecoveryPoint {
    Checkpoint(PathBuf),
    /// The model as training started, used until the first checkpoint exists.
    Snapshot(Box<ModelState>),
}

impl RecoveryPoint {
    pub fn restore<B: AutodiffBackend>(
        &self,
        step: StepConfig,
        device: &B::Device,
    ) -> Result<Recognizer<B>, CheckpointError> {
        match self {
            RecoveryPoint::Checkpoint(path) => load(path, step, device),
            RecoveryPoint::Snapshot(state) => Recognizer::from_state((**state).clone(), step, device),
        }
    }
}

pub fn fresh<B: AutodiffBackend>(
    config: &TrainingConfig,
    codec: Codec,
    device: &B::Device,
) -> Recognizer<B> {
    Recognizer::new(
        config.height,
        config.hidden_size,
        codec,
        config.bidirectional,
        config.step_config(),
        device,
    )
}

pub fn load<B: AutodiffBackend>(
    path: &Path,
    step: StepConfig,
    device: &B::Device,
) -> Result<Recognizer<B>, CheckpointError> {
    Recognizer::from_state(read_state(path)?, step, device)
}

/// Loads the configured model or builds a fresh one, attaches `lnorm` when
/// the model has none, and skips the trial count that a save just covered.
pub fn start<B: AutodiffBackend>(
    config: &TrainingConfig,
    codec: Codec,
    lnorm: CenterNormalizer,
    device: &B::Device,
) -> Result<(Recognizer<B>, RecoveryPoint), CheckpointError> {
    let (mut recognizer, checkpoint) = match &config.load {
        Some(path) => {
            info!("loading {path}");
            let recognizer = load::<B>(Path::new(path), config.step_config(), device)?;
            if recognizer.codec() != &codec {
                warn!(
                    "using the charset stored in {path} ({} symbols) instead of the configured one ({} symbols)",
                    recognizer.codec().len(),
                    codec.len()
                );
            }
            (recognizer, Some(PathBuf::from(path)))
        }
        None => (fresh::<B>(config, codec, device), None),
    };
    if recognizer.lnorm().is_none() {
        recognizer.set_lnorm(lnorm);
    }
    if skips_saved_trial(recognizer.last_trial, config.save_freq) {
        recognizer.last_trial += 1;
    }
    info!("last_trial {}", recognizer.last_trial);

    let recovery = match checkpoint {
        Some(path) => RecoveryPoint::Checkpoint(path),
        None => RecoveryPoint::Snapshot(Box::new(recognizer.to_state(false)?)),
    };

    Ok((recognizer, recovery))
}

/// A count one short of a save point was already covered by that save.
/// Every count is a save point when `save_freq` is 1, so nothing is skipped.
fn skips_saved_trial(last_trial: usize, save_freq: usize) -> bool {
    save_freq > 1 && last_trial % save_freq == save_freq - 1
}

/// Writes `recognizer` to `path`. With `strip`, the stored copy carries no
/// training log; the in-memory recognizer is untouched either way.
pub fn save<B: AutodiffBackend>(
    path: &Path,
    recognizer: &Recognizer<B>,
    strip: bool,
) -> Result<(), CheckpointError> {
    write_state(path, recognizer.to_state(strip)?)
}
