use std::path::{Path, PathBuf};

use image::ImageResult;
use log::debug;
use ndarray::{s, Array2, Axis};

use super::canvas::{Canvas, Colormap, Rect, Stroke, BLACK, BLUE, GRAY, GREEN, RED, WHITE};
use crate::model::log::TrainingLog;

/// Used when no display path is configured.
pub const DEFAULT_DISPLAY_PATH: &str = "training.png";
pub const WIDTH: u32 = 1400;
pub const HEIGHT: u32 = 800;
/// Trailing trials shown in the error panel.
pub const ERROR_WINDOW: usize = 10_000;
/// Gaussian sigma of the smoothed error curves.
pub const ERROR_SMOOTHING: f64 = 100.0;
const PANELS: u32 = 5;
const MARGIN: u32 = 6;
/// Floor of the log-scaled error axis.
const LOG_FLOOR: f64 = 1e-4;

/// Everything shown for one trial.
pub struct DiagnosticFrame<'a> {
    pub trial: usize,
    /// Time-major input line, `[frames, height]`.
    pub line: &'a Array2<f32>,
    /// Posteriors, `[frames, classes]`.
    pub outputs: &'a Array2<f64>,
    pub aligned: &'a Array2<f64>,
    pub log: &'a TrainingLog,
    pub transcript: &'a str,
    /// Text read from the alignment.
    pub aligned_text: &'a str,
    /// Text read from the outputs.
    pub output_text: &'a str,
}

/// Draws training diagnostics into one canvas that lives for the whole
/// session and writes it to the display path after every render.
pub struct DiagnosticsRenderer {
    canvas: Canvas,
    display_path: PathBuf,
    movie: Option<String>,
}

impl DiagnosticsRenderer {
    pub fn new(display_path: PathBuf, movie: Option<String>) -> Self {
        Self {
            canvas: Canvas::new(WIDTH, HEIGHT),
            display_path,
            movie,
        }
    }

    pub fn display_path(&self) -> &Path {
        &self.display_path
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn movie_frame_path(&self, trial: usize) -> Option<PathBuf> {
        self.movie
            .as_ref()
            .map(|movie| PathBuf::from(format!("{movie}-{trial:08}.png")))
    }

    /// Redraws the canvas, writes it to the display path and, in movie mode,
    /// to the frame of `frame.trial`.
    pub fn render(&mut self, frame: &DiagnosticFrame) -> ImageResult<()> {
        self.draw(frame);
        debug!(
            "frame {}: TRU {:?} ALN {:?} OUT {:?}",
            frame.trial, frame.transcript, frame.aligned_text, frame.output_text
        );

        self.canvas.save(&self.display_path)?;
        if let Some(path) = self.movie_frame_path(frame.trial) {
            self.canvas.save(&path)?;
        }

        Ok(())
    }

    fn panel(index: u32) -> Rect {
        let height = HEIGHT / PANELS;
        Rect::new(0, index * height, WIDTH, height).inset(MARGIN)
    }

    pub fn draw(&mut self, frame: &DiagnosticFrame) {
        self.canvas.clear(WHITE);

        // ink is high in the line, draw it dark on light
        let line = frame.line.mapv(|v| 1.0 - f64::from(v));
        self.canvas
            .heatmap(Self::panel(0), line.t(), (0.0, 1.0), Colormap::Gray);

        let classes = frame.outputs.ncols();
        if classes > 1 {
            self.canvas.heatmap(
                Self::panel(1),
                frame.outputs.slice(s![.., 1..]).t(),
                (0.0, 1.0),
                Colormap::Hot,
            );
            self.canvas.heatmap(
                Self::panel(2),
                frame.aligned.slice(s![.., 1..]).t(),
                (0.0, 1.0),
                Colormap::Hot,
            );
        }

        self.draw_traces(Self::panel(3), frame.outputs, frame.aligned);
        self.draw_errors(Self::panel(4), frame.log);

        for index in 0..PANELS {
            self.canvas.frame(Self::panel(index), GRAY);
        }
    }

    /// Blank, class 1 and the best other class over time; outputs solid,
    /// alignment dashed.
    fn draw_traces(&mut self, rect: Rect, outputs: &Array2<f64>, aligned: &Array2<f64>) {
        for (matrix, dashed) in [(outputs, false), (aligned, true)] {
            for (values, color) in traces(matrix).into_iter().zip([BLUE, GREEN, RED]) {
                let stroke = if dashed {
                    Stroke::solid(color).dashed()
                } else {
                    Stroke::solid(color)
                };
                self.canvas.polyline(rect, &values, (0.0, 1.0), stroke);
            }
        }
    }

    fn draw_errors(&mut self, rect: Rect, log: &TrainingLog) {
        if log.is_empty() {
            return;
        }
        let scaled = |values: &[f64]| -> Vec<f64> {
            values.iter().map(|v| v.max(LOG_FLOOR).log10()).collect()
        };
        let raw = scaled(log.recent_errors(ERROR_WINDOW));
        let smoothed = scaled(&log.smoothed_errors(ERROR_WINDOW, ERROR_SMOOTHING));
        let char_errors = scaled(&log.smoothed_char_errors(ERROR_WINDOW, ERROR_SMOOTHING));

        let (lo, hi) = raw
            .iter()
            .chain(&smoothed)
            .chain(&char_errors)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = (lo.floor(), hi.ceil().max(lo.floor() + 1.0));

        self.canvas
            .polyline(rect, &raw, range, Stroke::solid(BLACK).faded(0.25));
        self.canvas.polyline(rect, &smoothed, range, Stroke::solid(BLACK));
        self.canvas
            .polyline(rect, &char_errors, range, Stroke::solid(RED).dashed());
    }
}

/// `[blank, class 1, max over classes 2..]` per frame.
fn traces(matrix: &Array2<f64>) -> [Vec<f64>; 3] {
    let column = |c: usize| -> Vec<f64> {
        if c < matrix.ncols() {
            matrix.column(c).to_vec()
        } else {
            vec![0.0; matrix.nrows()]
        }
    };
    let rest: Vec<f64> = if matrix.ncols() > 2 {
        matrix
            .slice(s![.., 2..])
            .map_axis(Axis(1), |row| row.fold(0.0, |a: f64, &b| a.max(b)))
            .to_vec()
    } else {
        vec![0.0; matrix.nrows()]
    };

    [column(0), column(1), rest]
}
