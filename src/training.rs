use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{config::Config, tensor::backend::AutodiffBackend};
use log::{debug, error, info, warn};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    callback::{SkipReason, TrainingCallback, TrainingSummary, TrialOutcome, TrialReport},
    checkpoint::CheckpointNamer,
    cli::BackendKind,
    dataset::{read_transcript, transcript_path, LineDataset},
    diagnostics::{render::DEFAULT_DISPLAY_PATH, DiagnosticFrame, DiagnosticsRenderer},
    error::{ConfigError, Error, PreprocessError, StepError},
    image_data::{read_gray, LinePreprocessor},
    lifecycle::{self, RecoveryPoint},
    model::{
        ctc::{edit_distance, translate_back},
        recognizer::{Recognizer, StepConfig},
    },
    parse_config::TrainingSetup,
    utils::label_converter::Codec,
};

#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Checkpoint template with a `%d` placeholder, or a prefix.
    pub output: String,
    #[config(default = "BackendKind::NdArray")]
    pub backend: BackendKind,
    /// Normalized line height, the network input size.
    #[config(default = 48)]
    pub height: usize,
    #[config(default = 100)]
    pub hidden_size: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 5000)]
    pub max_frames: usize,
    #[config(default = false)]
    pub verbose_updates: bool,
    /// Dewarp lines while training; otherwise inputs are `.dew.png` files.
    #[config(default = true)]
    pub normalize: bool,
    #[config(default = 1000)]
    pub save_freq: usize,
    #[config(default = 1000000)]
    pub ntrain: usize,
    /// Drop the training log from saved models.
    #[config(default = true)]
    pub strip: bool,
    #[config(default = 16)]
    pub pad: usize,
    /// Overrides the trial count stored in the model.
    #[config(default = "None")]
    pub start: Option<usize>,
    #[config(default = "None")]
    pub load: Option<String>,
    /// Render diagnostics every this many trials; 0 disables.
    #[config(default = 0)]
    pub display: usize,
    #[config(default = "None")]
    pub display_path: Option<String>,
    #[config(default = "None")]
    pub movie: Option<String>,
    #[config(default = "None")]
    pub movie_sample: Option<String>,
    #[config(default = false)]
    pub quiet: bool,
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl TrainingConfig {
    pub fn step_config(&self) -> StepConfig {
        StepConfig::new()
            .with_learning_rate(self.learning_rate)
            .with_momentum(self.momentum)
            .with_max_frames(self.max_frames)
            .with_verbose_updates(self.verbose_updates)
    }

    pub fn namer(&self) -> Result<CheckpointNamer, ConfigError> {
        CheckpointNamer::new(&self.output, self.backend.checkpoint_extension())
    }
}

/// Builds the codec from transcript files, or the default charset without any.
pub fn build_codec(sources: &[PathBuf]) -> Result<Codec, Error> {
    if sources.is_empty() {
        info!("using default codec");
        return Ok(Codec::default_charset());
    }

    info!("building codec from {} files", sources.len());
    let mut texts = Vec::with_capacity(sources.len());
    for path in sources {
        let text = fs::read_to_string(path).map_err(|source| PreprocessError::Io {
            path: path.clone(),
            source,
        })?;
        texts.push(text);
    }

    Ok(Codec::from_transcripts(texts.iter().map(String::as_str)))
}

fn clip(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

/// The training loop over one recognizer.
pub struct TrainingSession<B: AutodiffBackend> {
    config: TrainingConfig,
    recognizer: Recognizer<B>,
    recovery: RecoveryPoint,
    preprocessor: LinePreprocessor,
    dataset: LineDataset,
    tests: Vec<PathBuf>,
    namer: CheckpointNamer,
    renderer: Option<DiagnosticsRenderer>,
    callbacks: Vec<Box<dyn TrainingCallback>>,
    rng: StdRng,
    summary: TrainingSummary,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new(
        config: TrainingConfig,
        recognizer: Recognizer<B>,
        recovery: RecoveryPoint,
        dataset: LineDataset,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        if dataset.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        if config.save_freq == 0 {
            return Err(ConfigError::NotPositive("savefreq"));
        }
        let namer = config.namer()?;
        let renderer = (config.display > 0).then(|| {
            let path = config.display_path.as_deref().unwrap_or(DEFAULT_DISPLAY_PATH);
            DiagnosticsRenderer::new(PathBuf::from(path), config.movie.clone())
        });
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            preprocessor: LinePreprocessor::new(config.normalize, config.pad),
            config,
            recognizer,
            recovery,
            dataset,
            tests: Vec::new(),
            namer,
            renderer,
            callbacks: Vec::new(),
            rng,
            summary: TrainingSummary::default(),
            device,
        })
    }

    /// Lines recognized at every checkpoint to estimate the error rate.
    pub fn with_tests(mut self, tests: Vec<PathBuf>) -> Self {
        self.tests = tests;
        self
    }

    pub fn register_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        debug!("registered callback {}", callback.name());
        self.callbacks.push(Box::new(callback));
    }

    pub fn recognizer(&self) -> &Recognizer<B> {
        &self.recognizer
    }

    /// Where the next numeric fault reloads from.
    pub fn recovery_point(&self) -> &RecoveryPoint {
        &self.recovery
    }

    pub fn into_recognizer(self) -> Recognizer<B> {
        self.recognizer
    }

    /// Fails on the first input name that does not fit the line estimation mode.
    pub fn check_inputs(&self) -> Result<(), PreprocessError> {
        self.dataset
            .iter()
            .try_for_each(|path| self.preprocessor.check_path(path))
    }

    /// Trains from the start trial up to `ntrain`.
    pub fn run(&mut self) -> Result<TrainingSummary, Error> {
        let start = self.config.start.unwrap_or(self.recognizer.last_trial);
        info!("training trials {start}..{}", self.config.ntrain);
        for callback in &mut self.callbacks {
            callback.on_train_begin(start, self.config.ntrain);
        }

        for trial in start..self.config.ntrain {
            let report = self.run_trial(trial)?;
            match report.outcome {
                TrialOutcome::Trained { .. } => self.summary.trained += 1,
                TrialOutcome::Skipped(_) => self.summary.skipped += 1,
                TrialOutcome::Recovered => {}
            }
            for callback in &mut self.callbacks {
                callback.on_trial_end(&report);
            }
        }

        self.summary.last_trial = self.recognizer.last_trial;
        for callback in &mut self.callbacks {
            callback.on_train_end(&self.summary);
        }

        Ok(self.summary.clone())
    }

    fn next_sample(&mut self, do_display: bool) -> Result<(PathBuf, bool), ConfigError> {
        if let (Some(_), Some(sample), true) =
            (&self.config.movie, &self.config.movie_sample, do_display)
        {
            return Ok((PathBuf::from(sample), false));
        }
        let path = self.dataset.sample(&mut self.rng).ok_or(ConfigError::NoInputs)?;

        Ok((path.to_path_buf(), true))
    }

    /// Runs one trial. Only faults outside the recoverable set are returned.
    pub fn run_trial(&mut self, trial: usize) -> Result<TrialReport, Error> {
        self.recognizer.last_trial = trial + 1;
        self.summary.trials += 1;

        let display = self.config.display;
        let do_display = display > 0 && trial % display == 0;
        let (path, update) = self.next_sample(do_display)?;

        let skipped = |reason| {
            let mut report = TrialReport::new(trial, TrialOutcome::Skipped(reason));
            report.path = Some(path.clone());
            report
        };

        let loaded = read_gray(&path).and_then(|line| {
            let transcript = transcript_path(&path);
            read_transcript(&transcript)
                .map(|text| (line, text))
                .map_err(|source| PreprocessError::Io {
                    path: transcript,
                    source,
                })
        });
        let (raw, transcript) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("ERROR {err}");
                return Ok(skipped(SkipReason::Unreadable));
            }
        };

        self.preprocessor.check_path(&path)?;
        let line = match self.preprocessor.prepare_line(raw, self.recognizer.lnorm()) {
            Ok(line) => line,
            Err(PreprocessError::Degenerate(_)) => {
                info!("EMPTY-INPUT {}", path.display());
                return Ok(skipped(SkipReason::Degenerate));
            }
            Err(err) => return Err(err.into()),
        };

        let labels = match self.recognizer.codec().encode(&transcript) {
            Ok(labels) => labels,
            Err(err) => {
                warn!("{}: {err}", path.display());
                return Ok(skipped(SkipReason::UnknownSymbol));
            }
        };

        let predicted = match self.recognizer.train_sequence(&line, &labels, update) {
            Ok(predicted) => predicted,
            Err(StepError::Numeric(fault)) => {
                error!("numeric fault in trial {trial} on {}: {fault}", path.display());
                self.recover(trial)?;
                let mut report = TrialReport::new(trial, TrialOutcome::Recovered);
                report.path = Some(path.clone());
                return Ok(report);
            }
            Err(err @ StepError::Length { .. }) => {
                debug!("{}: {err}", path.display());
                return Ok(skipped(SkipReason::Length));
            }
            Err(err) => return Err(err.into()),
        };

        let report = self.describe_trial(trial, &path, &line, &transcript, &labels, &predicted, update);

        if (trial + 1) % self.config.save_freq == 0 {
            self.save_checkpoint(trial + 1)?;
        }
        if do_display {
            self.render(&report, &line);
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn describe_trial(
        &self,
        trial: usize,
        path: &Path,
        line: &Array2<f32>,
        transcript: &str,
        labels: &[u32],
        predicted: &[u32],
        update: bool,
    ) -> TrialReport {
        let codec = self.recognizer.codec();
        let output = codec.decode(predicted);
        let aligned = self
            .recognizer
            .aligned()
            .map(|aligned| codec.decode(&translate_back(aligned)))
            .unwrap_or_default();

        if !self.config.quiet {
            let width = transcript.chars().count() + 5;
            info!(
                "{trial} {:.2} {:?} {}",
                self.recognizer.last_error(),
                line.dim(),
                path.display()
            );
            info!("   TRU: {transcript:?}");
            info!("   ALN: {:?}", clip(&aligned, width));
            info!("   OUT: {:?}", clip(&output, width));
        }

        let error = self.recognizer.log().errors().last().copied().unwrap_or_default();
        TrialReport {
            trial,
            path: Some(path.to_path_buf()),
            outcome: TrialOutcome::Trained {
                error,
                distance: edit_distance(labels, predicted),
                labels: labels.len(),
            },
            updated: update,
            truth: Some(transcript.to_string()),
            aligned: Some(aligned),
            output: Some(output),
        }
    }

    /// Replaces the faulted recognizer with the recovery point.
    fn recover(&mut self, trial: usize) -> Result<(), Error> {
        let mut recognizer = self
            .recovery
            .restore::<B>(self.config.step_config(), &self.device)?;
        if recognizer.lnorm().is_none() {
            if let Some(lnorm) = self.recognizer.lnorm() {
                recognizer.set_lnorm(lnorm.clone());
            }
        }
        info!("reloaded model at trial {}", recognizer.last_trial);

        self.recognizer = recognizer;
        self.summary.recoveries += 1;
        for callback in &mut self.callbacks {
            callback.on_recovery(trial);
        }

        Ok(())
    }

    /// Saves the recognizer as of `trials` and makes it the recovery point.
    pub fn save_checkpoint(&mut self, trials: usize) -> Result<PathBuf, Error> {
        let path = self.namer.path_for(trials);
        info!("saving {}", path.display());
        lifecycle::save(&path, &self.recognizer, self.config.strip)?;

        self.recovery = RecoveryPoint::Checkpoint(path.clone());
        self.summary.checkpoints.push(path.clone());
        for callback in &mut self.callbacks {
            callback.on_checkpoint(trials, &path);
        }

        if let Some(rate) = self.evaluate_tests() {
            info!("test error rate at {trials}: {rate:.4}");
        }

        Ok(path)
    }

    /// Character error rate of the recognizer on the test lines, or `None`
    /// when no test line could be used.
    pub fn evaluate_tests(&self) -> Option<f64> {
        let mut errors = 0;
        let mut total = 0;
        for path in &self.tests {
            match self.evaluate_line(path) {
                Ok((distance, labels)) => {
                    errors += distance;
                    total += labels;
                }
                Err(err) => debug!("test line {} skipped: {err}", path.display()),
            }
        }

        (total > 0).then(|| errors as f64 / total as f64)
    }

    fn evaluate_line(&self, path: &Path) -> Result<(usize, usize), Error> {
        let transcript = read_transcript(&transcript_path(path))?;
        let labels = self.recognizer.codec().encode(&transcript)?;
        let line = self.preprocessor.prepare(path, self.recognizer.lnorm())?;
        let predicted = self.recognizer.recognize(&line)?;

        Ok((edit_distance(&labels, &predicted), labels.len()))
    }

    fn render(&mut self, report: &TrialReport, line: &Array2<f32>) {
        let (Some(renderer), Some(outputs), Some(aligned)) = (
            self.renderer.as_mut(),
            self.recognizer.outputs(),
            self.recognizer.aligned(),
        ) else {
            return;
        };
        let frame = DiagnosticFrame {
            trial: report.trial,
            line,
            outputs,
            aligned,
            log: self.recognizer.log(),
            transcript: report.truth.as_deref().unwrap_or_default(),
            aligned_text: report.aligned.as_deref().unwrap_or_default(),
            output_text: report.output.as_deref().unwrap_or_default(),
        };
        if let Err(err) = renderer.render(&frame) {
            warn!("cannot render diagnostics: {err}");
        }
    }
}

/// Builds the codec and the recognizer described by `setup` and trains it.
pub fn train<B: AutodiffBackend>(
    setup: TrainingSetup,
    device: B::Device,
) -> Result<TrainingSummary, Error> {
    let TrainingSetup {
        config,
        lnorm,
        inputs,
        tests,
        codec_sources,
        check_inputs,
    } = setup;
    if let Some(seed) = config.seed {
        B::seed(seed);
    }
    info!("inputs {}", inputs.len());
    info!("tests {}", tests.len());

    let codec = build_codec(&codec_sources)?;
    info!("charset size {} {}", codec.len(), codec.describe());

    let (recognizer, recovery) = lifecycle::start::<B>(&config, codec, lnorm, &device)?;
    let mut session =
        TrainingSession::new(config, recognizer, recovery, LineDataset::new(inputs), device)?
            .with_tests(tests);
    if check_inputs {
        session.check_inputs()?;
    }

    session.run()
}

#[cfg(test)]
mod test {
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    use super::*;
    use crate::line_norm::CenterNormalizer;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_config_defaults() {
        let config = TrainingConfig::new("model".to_string());
        assert_eq!(config.save_freq, 1000);
        assert_eq!(config.max_frames, 5000);
        assert_eq!(config.backend, BackendKind::NdArray);
        assert!(config.strip && config.bidirectional);
        assert_eq!(
            config.namer().unwrap().path_for(1000),
            PathBuf::from("model-00001000.rnn.gz")
        );
        assert_eq!(config.step_config().momentum, 0.9);
    }

    #[test]
    fn test_build_codec_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.gt.txt");
        let second = dir.path().join("b.gt.txt");
        fs::write(&first, "cat\n").unwrap();
        fs::write(&second, "dog").unwrap();

        let codec = build_codec(&[first, second]).unwrap();
        let symbols: Vec<&str> = codec.symbols().collect();
        assert_eq!(symbols, vec!["", " ", "~", "a", "c", "d", "g", "o", "t"]);
        assert_eq!(build_codec(&[]).unwrap(), Codec::default_charset());
    }

    #[test]
    fn test_session_needs_inputs() {
        let device = NdArrayDevice::Cpu;
        let config = TrainingConfig::new("m".to_string()).with_height(8).with_hidden_size(2);
        let (recognizer, recovery) = lifecycle::start::<TestBackend>(
            &config,
            Codec::from_transcripts(["ab"]),
            CenterNormalizer::new(8),
            &device,
        )
        .unwrap();

        assert!(matches!(
            TrainingSession::new(config, recognizer, recovery, LineDataset::default(), device),
            Err(ConfigError::NoInputs)
        ));
    }

    #[test]
    fn test_clip_counts_chars() {
        assert_eq!(clip("größer", 3), "grö");
        assert_eq!(clip("ab", 10), "ab");
    }
}
