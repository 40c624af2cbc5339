pub mod canvas;
pub mod render;

pub use render::{DiagnosticFrame, DiagnosticsRenderer};
