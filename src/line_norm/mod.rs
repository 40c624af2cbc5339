pub mod center;
pub mod filters;

pub use center::{CenterNormalizer, LineMeasure};

use crate::error::ConfigError;

/// Line estimators selectable with `--lineest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizerKind {
    Center,
}

impl NormalizerKind {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "center" => Ok(Self::Center),
            other => Err(ConfigError::UnknownNormalizer(other.to_string())),
        }
    }

    pub fn build(self, target_height: usize) -> CenterNormalizer {
        match self {
            Self::Center => CenterNormalizer::new(target_height),
        }
    }
}
