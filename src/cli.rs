use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

impl BackendKind {
    /// Extension of checkpoints written without an output template.
    pub fn checkpoint_extension(self) -> &'static str {
        match self {
            BackendKind::NdArray => "rnn",
            BackendKind::Wgpu => "wrnn",
        }
    }
}

/// Flags left unset fall back to the `--config` file, then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "lstm-ocr", about = "train an RNN recognizer")]
pub struct TrainArgs {
    /// Type of text line estimator [default: center].
    #[arg(short = 'e', long)]
    pub lineest: Option<String>,
    /// Don't perform line estimation; inputs must be .dew.png files.
    #[arg(short = 'E', long)]
    pub nolineest: bool,
    /// Height lines are normalized to [default: 48].
    #[arg(short = 'l', long)]
    pub height: Option<usize>,
    /// Only perform line estimation and write .dew.png files.
    #[arg(long)]
    pub dewarp: bool,

    /// Construct the codec from these transcript files.
    #[arg(short = 'c', long, num_args = 1..)]
    pub codec: Vec<String>,

    /// Tensor backend [default: ndarray].
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    /// LSTM learning rate [default: 1e-4].
    #[arg(short = 'r', long)]
    pub lrate: Option<f64>,
    /// Number of LSTM state units [default: 100].
    #[arg(short = 'S', long)]
    pub hiddensize: Option<usize>,
    /// Model file template with %d in it, or a prefix.
    #[arg(short = 'o', long)]
    pub output: Option<String>,
    /// Save a model every this many trials [default: 1000].
    #[arg(short = 'F', long)]
    pub savefreq: Option<usize>,
    /// Keep the training log in saved models.
    #[arg(long)]
    pub no_strip: bool,
    /// Number of lines to train before stopping [default: 1000000].
    #[arg(short = 'N', long)]
    pub ntrain: Option<usize>,
    /// Colon-separated test lines for error estimation at every save.
    #[arg(short = 't', long)]
    pub tests: Option<String>,
    /// Use only a unidirectional LSTM.
    #[arg(long)]
    pub unidirectional: bool,
    /// Log every weight update.
    #[arg(long)]
    pub updates: bool,
    /// Start training with a previously trained model.
    #[arg(long)]
    pub load: Option<String>,
    /// Number of already learned lines, overriding the one stored in the model.
    #[arg(long)]
    pub start: Option<usize>,

    #[arg(short = 'v', long)]
    pub verbose: bool,
    /// Render diagnostics every this many trials; 0 disables.
    #[arg(short = 'd', long)]
    pub display: Option<usize>,
    /// Image the diagnostics are written to [default: training.png].
    #[arg(long)]
    pub display_path: Option<String>,
    /// Prefix of movie frames; needs --display of 2 or more.
    #[arg(short = 'm', long)]
    pub movie: Option<String>,
    /// Line shown in movie frames [default: first input].
    #[arg(short = 'M', long)]
    pub moviesample: Option<String>,
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Skip checking input names against the line estimation mode.
    #[arg(short = 'Q', long)]
    pub nocheck: bool,
    /// Zero frames added at both ends of each line [default: 16].
    #[arg(short = 'p', long)]
    pub pad: Option<usize>,

    /// File listing input files, one per line.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,
    /// Seed of the line sampler.
    #[arg(long)]
    pub seed: Option<u64>,
    /// YAML file with MODEL and TRAINING defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    pub files: Vec<String>,
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_consistent() {
        TrainArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let args = TrainArgs::parse_from([
            "lstm-ocr", "-o", "model", "-F", "10", "--backend", "wgpu", "-E", "--no-strip", "-t",
            "a.png:b/*.png", "l1.dew.png", "l2.dew.png",
        ]);

        assert_eq!(args.output.as_deref(), Some("model"));
        assert_eq!(args.savefreq, Some(10));
        assert_eq!(args.backend, Some(BackendKind::Wgpu));
        assert!(args.nolineest && args.no_strip);
        assert_eq!(args.tests.as_deref(), Some("a.png:b/*.png"));
        assert_eq!(args.files, vec!["l1.dew.png", "l2.dew.png"]);
        assert_eq!(args.height, None);
    }

    #[test]
    fn test_backend_names() {
        let args = TrainArgs::parse_from(["lstm-ocr", "--backend", "ndarray"]);
        assert_eq!(args.backend, Some(BackendKind::NdArray));
        assert_eq!(BackendKind::NdArray.checkpoint_extension(), "rnn");
        assert_eq!(BackendKind::Wgpu.checkpoint_extension(), "wrnn");
    }
}
