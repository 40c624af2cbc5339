use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    cli::{BackendKind, TrainArgs},
    dataset::{glob_all, read_file_list},
    error::ConfigError,
    line_norm::{CenterNormalizer, NormalizerKind},
    training::TrainingConfig,
};

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ModelYaml {
    pub height: Option<usize>,
    pub hidden_size: Option<usize>,
    pub lineest: Option<String>,
    pub unidirectional: Option<bool>,
    pub backend: Option<BackendKind>,
    pub codec: Option<Vec<String>>,
    pub max_frames: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TrainingYaml {
    pub learning_rate: Option<f64>,
    pub momentum: Option<f64>,
    pub output: Option<String>,
    pub save_freq: Option<usize>,
    pub ntrain: Option<usize>,
    pub strip: Option<bool>,
    pub pad: Option<usize>,
    pub seed: Option<u64>,
    pub display: Option<usize>,
    pub display_path: Option<String>,
    pub tests: Option<Vec<String>>,
    pub quiet: Option<bool>,
}

/// Defaults read from a `--config` YAML file; command line flags win.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct FileConfig {
    pub model: ModelYaml,
    pub training: TrainingYaml,
}

impl FileConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&text)?)
    }

    /// The file named by `--config`, or all defaults.
    pub fn for_args(args: &TrainArgs) -> Result<Self, ConfigError> {
        match &args.config {
            Some(path) => Self::from_yaml(path),
            None => Ok(Self::default()),
        }
    }
}

/// Everything a training run needs, resolved from flags, file and defaults.
#[derive(Debug)]
pub struct TrainingSetup {
    pub config: TrainingConfig,
    pub lnorm: CenterNormalizer,
    pub inputs: Vec<PathBuf>,
    pub tests: Vec<PathBuf>,
    /// Transcript files the codec is built from; empty selects the default charset.
    pub codec_sources: Vec<PathBuf>,
    pub check_inputs: bool,
}

/// Positional inputs with globs expanded, followed by the `--file` list.
pub fn collect_inputs(args: &TrainArgs) -> Result<Vec<PathBuf>, ConfigError> {
    let mut inputs = glob_all(&args.files)?;
    if let Some(list) = &args.file {
        let listed = read_file_list(list).map_err(|source| ConfigError::Read {
            path: list.clone(),
            source,
        })?;
        inputs.extend(listed);
    }

    Ok(inputs)
}

pub fn line_normalizer(args: &TrainArgs, file: &FileConfig) -> Result<CenterNormalizer, ConfigError> {
    let name = args
        .lineest
        .as_deref()
        .or(file.model.lineest.as_deref())
        .unwrap_or("center");
    let height = args.height.or(file.model.height).unwrap_or(48);
    if height == 0 {
        return Err(ConfigError::NotPositive("height"));
    }

    Ok(NormalizerKind::parse(name)?.build(height))
}

pub fn resolve(
    args: &TrainArgs,
    file: &FileConfig,
    inputs: Vec<PathBuf>,
) -> Result<TrainingSetup, ConfigError> {
    let (model, training) = (&file.model, &file.training);

    let display = args.display.or(training.display).unwrap_or(0);
    if args.movie.is_some() && display < 2 {
        return Err(ConfigError::MovieNeedsDisplay);
    }
    let output = args
        .output
        .clone()
        .or_else(|| training.output.clone())
        .ok_or(ConfigError::MissingOutput)?;

    let save_freq = args.savefreq.or(training.save_freq).unwrap_or(1000);
    if save_freq == 0 {
        return Err(ConfigError::NotPositive("savefreq"));
    }
    let hidden_size = args.hiddensize.or(model.hidden_size).unwrap_or(100);
    if hidden_size == 0 {
        return Err(ConfigError::NotPositive("hiddensize"));
    }
    let lnorm = line_normalizer(args, file)?;

    let test_patterns: Vec<String> = match (&args.tests, &training.tests) {
        (Some(tests), _) => tests.split(':').map(String::from).collect(),
        (None, Some(tests)) => tests.clone(),
        (None, None) => Vec::new(),
    };
    let codec_patterns = if args.codec.is_empty() {
        model.codec.clone().unwrap_or_default()
    } else {
        args.codec.clone()
    };
    let movie_sample = args
        .moviesample
        .clone()
        .or_else(|| inputs.first().map(|p| p.to_string_lossy().into_owned()));

    let config = TrainingConfig::new(output)
        .with_backend(args.backend.or(model.backend).unwrap_or_default())
        .with_height(lnorm.target_height)
        .with_hidden_size(hidden_size)
        .with_bidirectional(!(args.unidirectional || model.unidirectional.unwrap_or(false)))
        .with_learning_rate(args.lrate.or(training.learning_rate).unwrap_or(1e-4))
        .with_momentum(training.momentum.unwrap_or(0.9))
        .with_max_frames(model.max_frames.unwrap_or(5000))
        .with_verbose_updates(args.updates)
        .with_normalize(!args.nolineest)
        .with_save_freq(save_freq)
        .with_ntrain(args.ntrain.or(training.ntrain).unwrap_or(1_000_000))
        .with_strip(!args.no_strip && training.strip.unwrap_or(true))
        .with_pad(args.pad.or(training.pad).unwrap_or(16))
        .with_start(args.start)
        .with_load(args.load.clone())
        .with_display(display)
        .with_display_path(
            args.display_path
                .clone()
                .or_else(|| training.display_path.clone()),
        )
        .with_movie(args.movie.clone())
        .with_movie_sample(movie_sample)
        .with_quiet(args.quiet || training.quiet.unwrap_or(false))
        .with_seed(args.seed.or(training.seed));

    Ok(TrainingSetup {
        config,
        lnorm,
        inputs,
        tests: glob_all(&test_patterns)?,
        codec_sources: glob_all(&codec_patterns)?,
        check_inputs: !args.nocheck,
    })
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    fn args(flags: &[&str]) -> TrainArgs {
        TrainArgs::parse_from(std::iter::once("lstm-ocr").chain(flags.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let setup = resolve(&args(&["-o", "m"]), &FileConfig::default(), vec!["a.png".into()]).unwrap();
        let config = &setup.config;

        assert_eq!(config.output, "m");
        assert_eq!(config.height, 48);
        assert_eq!(config.hidden_size, 100);
        assert_eq!(config.save_freq, 1000);
        assert_eq!(config.ntrain, 1_000_000);
        assert_eq!(config.pad, 16);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.backend, BackendKind::NdArray);
        assert_eq!(config.movie_sample.as_deref(), Some("a.png"));
        assert!(config.bidirectional && config.strip && config.normalize);
        assert!(setup.check_inputs);
        assert!(setup.tests.is_empty() && setup.codec_sources.is_empty());
        assert_eq!(setup.lnorm, CenterNormalizer::new(48));
    }

    #[test]
    fn test_early_exits() {
        let file = FileConfig::default();
        assert!(matches!(
            resolve(&args(&[]), &file, vec![]),
            Err(ConfigError::MissingOutput)
        ));
        assert!(matches!(
            resolve(&args(&["-o", "m", "-m", "movie", "-d", "1"]), &file, vec![]),
            Err(ConfigError::MovieNeedsDisplay)
        ));
        assert!(matches!(
            resolve(&args(&["-o", "m", "-F", "0"]), &file, vec![]),
            Err(ConfigError::NotPositive("savefreq"))
        ));
        assert!(matches!(
            resolve(&args(&["-o", "m", "-e", "spline"]), &file, vec![]),
            Err(ConfigError::UnknownNormalizer(_))
        ));
    }

    #[test]
    fn test_yaml_defaults_and_cli_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "MODEL:\n  height: 32\n  hidden_size: 64\n  backend: wgpu\nTRAINING:\n  output: from-file\n  save_freq: 50\n  strip: false\n  tests: [t1.png, t2.png]\n",
        )
        .unwrap();
        let file = FileConfig::from_yaml(&path).unwrap();

        let setup = resolve(&args(&["-S", "20"]), &file, vec![]).unwrap();
        let config = &setup.config;
        assert_eq!(config.output, "from-file");
        assert_eq!(config.height, 32);
        assert_eq!(config.hidden_size, 20);
        assert_eq!(config.save_freq, 50);
        assert_eq!(config.backend, BackendKind::Wgpu);
        assert!(!config.strip);
        assert_eq!(setup.tests, vec![PathBuf::from("t1.png"), PathBuf::from("t2.png")]);
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "MODEL: [1, 2").unwrap();
        assert!(matches!(FileConfig::from_yaml(&path), Err(ConfigError::Yaml(_))));
        assert!(matches!(
            FileConfig::from_yaml(dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_collect_inputs_appends_file_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, "c.png\nd.png\n").unwrap();
        let list_flag = list.to_string_lossy().into_owned();

        let inputs = collect_inputs(&args(&["-f", &list_flag, "a.png"])).unwrap();
        assert_eq!(
            inputs,
            ["a.png", "c.png", "d.png"].map(PathBuf::from).to_vec()
        );
    }
}
