use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("symbol {symbol:?} is not in the codec alphabet")]
    UnknownSymbol { symbol: String },

    #[error("charset must start with \"\", \" \", \"~\", got {0:?}")]
    BadPrefix(Vec<String>),

    #[error("charset contains {0:?} more than once")]
    Duplicate(String),
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("degenerate line image: {0}")]
    Degenerate(&'static str),

    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Faults raised by a single recognizer training step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("input height {got} does not match network input size {expected}")]
    InputShape { expected: usize, got: usize },

    #[error("{frames} frames cannot carry {labels} labels (frame limit {limit})")]
    Length {
        frames: usize,
        labels: usize,
        limit: usize,
    },

    #[error("numeric fault: {0}")]
    Numeric(String),

    #[error("tensor conversion failed: {0}")]
    Tensor(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode checkpoint: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("cannot decode checkpoint: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("weight record error: {0}")]
    Record(String),

    #[error("stored charset is invalid: {0}")]
    Codec(#[from] CodecError),

    #[error("stored network does not match its charset: {0}")]
    Mismatch(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("you must give an output file with %d in it, or a prefix")]
    MissingOutput,

    #[error("you must set --display to some number greater than 1")]
    MovieNeedsDisplay,

    #[error("{0}: unknown line normalizer")]
    UnknownNormalizer(String),

    #[error("bad output template {0:?}: expected a single %d or %0Nd placeholder")]
    BadTemplate(String),

    #[error("no input lines to train on")]
    NoInputs,

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("bad input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
