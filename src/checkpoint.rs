use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CheckpointError, ConfigError},
    line_norm::CenterNormalizer,
    model::log::TrainingLog,
};

/// Suffix appended to every checkpoint name.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Everything needed to rebuild a recognizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub ni: usize,
    pub hidden: usize,
    pub no: usize,
    pub bidirectional: bool,
    pub charset: Vec<String>,
    pub lnorm: Option<CenterNormalizer>,
    pub last_trial: usize,
    pub log: TrainingLog,
    /// Network record, burn binary format.
    pub weights: Vec<u8>,
}

/// Models written before the line normalizer and the character error log
/// were stored. Always bidirectional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyModel {
    pub ni: usize,
    pub hidden: usize,
    pub charset: Vec<String>,
    pub last_trial: usize,
    pub errors: Vec<f64>,
    pub weights: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredModel {
    V1(LegacyModel),
    V2(ModelState),
}

impl StoredModel {
    pub fn upgrade(self) -> ModelState {
        match self {
            StoredModel::V1(legacy) => ModelState {
                ni: legacy.ni,
                hidden: legacy.hidden,
                no: legacy.charset.len(),
                bidirectional: true,
                charset: legacy.charset,
                lnorm: None,
                last_trial: legacy.last_trial,
                log: TrainingLog::from_errors(legacy.errors),
                weights: legacy.weights,
            },
            StoredModel::V2(state) => state,
        }
    }
}

pub fn write_stored(path: &Path, model: &StoredModel) -> Result<(), CheckpointError> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    rmp_serde::encode::write_named(&mut encoder, model)?;
    encoder.finish()?.flush()?;

    Ok(())
}

pub fn read_stored(path: &Path) -> Result<StoredModel, CheckpointError> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));

    Ok(rmp_serde::decode::from_read(decoder)?)
}

pub fn write_state(path: &Path, state: ModelState) -> Result<(), CheckpointError> {
    write_stored(path, &StoredModel::V2(state))
}

pub fn read_state(path: &Path) -> Result<ModelState, CheckpointError> {
    read_stored(path).map(StoredModel::upgrade)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Naming {
    /// printf-style `%d` or `%0Nd` placeholder.
    Template {
        head: String,
        width: usize,
        tail: String,
    },
    Prefix {
        prefix: String,
        extension: String,
    },
}

/// Maps trial counts to checkpoint paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointNamer {
    naming: Naming,
}

impl CheckpointNamer {
    /// `output` is a template when it contains `%`, a prefix otherwise.
    /// `extension` is only used for prefixes.
    pub fn new(output: &str, extension: &str) -> Result<Self, ConfigError> {
        let Some(start) = output.find('%') else {
            return Ok(Self {
                naming: Naming::Prefix {
                    prefix: output.to_string(),
                    extension: extension.to_string(),
                },
            });
        };

        let bad = || ConfigError::BadTemplate(output.to_string());
        let spec = &output[start + 1..];
        let end = spec.find('d').ok_or_else(bad)?;
        let digits = &spec[..end];
        let tail = &spec[end + 1..];
        if tail.contains('%') || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        let width = match digits {
            "" => 0,
            zero_padded if zero_padded.starts_with('0') => zero_padded.parse().map_err(|_| bad())?,
            _ => return Err(bad()),
        };

        Ok(Self {
            naming: Naming::Template {
                head: output[..start].to_string(),
                width,
                tail: tail.to_string(),
            },
        })
    }

    pub fn path_for(&self, trial: usize) -> PathBuf {
        let name = match &self.naming {
            Naming::Template { head, width, tail } => format!("{head}{trial:0width$}{tail}"),
            Naming::Prefix { prefix, extension } => format!("{prefix}-{trial:08}.{extension}"),
        };

        PathBuf::from(name + COMPRESSED_SUFFIX)
    }
}
