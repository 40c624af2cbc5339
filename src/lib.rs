pub mod burn_ext;
pub mod callback;
pub mod checkpoint;
pub mod cli;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod image_data;
pub mod lifecycle;
pub mod line_norm;
pub mod model;
pub mod parse_config;
pub mod training;
pub mod utils;
